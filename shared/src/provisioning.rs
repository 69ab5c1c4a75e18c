//! User provisioning operations: approval of pending registrations and the
//! password flows.

use serde_json::{json, Map};

use crate::services::{password_reset_email, reset_request_email, welcome_email};
use crate::utils::{generate_temporary_password, is_uuid, is_valid_email, non_blank, TEMPORARY_PASSWORD_LENGTH};
use crate::{
    authorize, require_session, AccessLevel, AccessPolicy, ApproveUserRequest, Compensation,
    EmailOnlyRequest, HttpRequest, HttpResponse, ServiceError, ServiceResult, Services,
    SetPasswordRequest, StepSpec, UserKey, UserRecord, WorkflowRun,
};

pub const MIN_PASSWORD_LENGTH: usize = 6;

pub const CREATE_IDENTITY: StepSpec = StepSpec::required("create_identity", Compensation::Available);
pub const INSERT_PROFILE: StepSpec = StepSpec::required("insert_profile", Compensation::Available);
pub const DELETE_PENDING: StepSpec = StepSpec::best_effort("delete_pending_registration", Compensation::None);
pub const SEND_WELCOME: StepSpec = StepSpec::required("send_welcome_email", Compensation::None);

pub const APPROVAL_STEPS: &[StepSpec] = &[CREATE_IDENTITY, INSERT_PROFILE, DELETE_PENDING, SEND_WELCOME];

pub const UPDATE_PASSWORD: StepSpec = StepSpec::required("update_password", Compensation::None);
pub const CLEAR_TEMPORARY_FLAG: StepSpec = StepSpec::required("clear_temporary_flag", Compensation::Available);

pub const SET_PASSWORD_STEPS: &[StepSpec] = &[UPDATE_PASSWORD, CLEAR_TEMPORARY_FLAG];

pub const FIND_IDENTITY: StepSpec = StepSpec::required("find_identity", Compensation::None);
pub const RESET_PASSWORD: StepSpec = StepSpec::required("reset_password", Compensation::None);
pub const MARK_TEMPORARY_FLAG: StepSpec = StepSpec::required("mark_temporary_flag", Compensation::Available);
pub const SEND_NEW_PASSWORD: StepSpec = StepSpec::required("send_new_password", Compensation::None);

pub const RESET_STEPS: &[StepSpec] = &[FIND_IDENTITY, RESET_PASSWORD, MARK_TEMPORARY_FLAG, SEND_NEW_PASSWORD];

pub const FIND_PROFILE: StepSpec = StepSpec::required("find_profile", Compensation::None);
pub const FLAG_RESET_REQUEST: StepSpec = StepSpec::required("flag_reset_request", Compensation::Available);
pub const COLLECT_ADMINS: StepSpec = StepSpec::required("collect_admins", Compensation::None);
pub const NOTIFY_ADMINS: StepSpec = StepSpec::required("notify_admins", Compensation::None);

pub const RESET_REQUEST_STEPS: &[StepSpec] = &[FIND_PROFILE, FLAG_RESET_REQUEST, COLLECT_ADMINS, NOTIFY_ADMINS];

pub const APPROVED_MESSAGE: &str = "Usuário aprovado! Senha temporária gerada e enviada por e-mail.";
pub const PASSWORD_SET_MESSAGE: &str = "Senha definida com sucesso!";
pub const PASSWORD_RESET_MESSAGE: &str = "Senha redefinida com sucesso e enviada por e-mail.";
pub const RESET_REQUESTED_MESSAGE: &str = "Solicitação de redefinição enviada aos administradores.";

/// Result of a provisioning operation together with its step record.
#[derive(Debug)]
pub struct ProvisioningReport {
    pub run: WorkflowRun,
    pub outcome: ServiceResult<Provisioned>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    pub message: &'static str,
    pub user_id: Option<String>,
}

impl ProvisioningReport {
    fn finish(run: WorkflowRun, outcome: ServiceResult<Provisioned>) -> Self {
        if run.is_aborted() {
            tracing::warn!(
                "[{}] aborted; applied steps left in place: {:?}",
                run.operation(),
                run.uncompensated()
            );
        }
        Self { run, outcome }
    }

    /// Outcome of an operation rejected before any step ran.
    fn rejected(run: WorkflowRun, err: ServiceError) -> Self {
        Self { run, outcome: Err(err) }
    }

    pub fn into_result(self) -> ServiceResult<Provisioned> {
        self.outcome
    }

    pub fn into_response(self) -> ServiceResult<HttpResponse> {
        let provisioned = self.outcome?;
        let extra = provisioned.user_id.map(|id| {
            let mut extra = Map::new();
            extra.insert("user_id".to_string(), json!(id));
            extra
        });
        Ok(HttpResponse::success(provisioned.message, extra))
    }
}

fn required_text(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_string)
}

struct ApprovalInput {
    nome: String,
    email: String,
    celular: Option<String>,
    funcao: Option<String>,
    id_filial: Option<String>,
    nivel: AccessLevel,
}

fn validate_approval(body: &ApproveUserRequest) -> ServiceResult<ApprovalInput> {
    let (nome, email) = match (required_text(body.nome.as_deref()), required_text(body.email.as_deref())) {
        (Some(nome), Some(email)) => (nome, email),
        _ => return Err(ServiceError::Validation("Nome e e-mail são obrigatórios.".to_string())),
    };
    if !is_valid_email(&email) {
        return Err(ServiceError::Validation(format!("E-mail inválido: \"{}\".", email)));
    }

    let id_filial = required_text(body.id_filial.as_deref());
    if let Some(id) = &id_filial {
        if !is_uuid(id) {
            return Err(ServiceError::Validation(format!(
                "id_filial inválido: \"{}\". Deve ser UUID.",
                id
            )));
        }
    }

    let nivel = AccessLevel::from_json(body.nivel.as_ref())?;

    Ok(ApprovalInput {
        nome,
        email,
        celular: required_text(body.celular.as_deref()),
        funcao: required_text(body.funcao.as_deref()),
        id_filial,
        nivel,
    })
}

fn validate_email_only(body: &EmailOnlyRequest) -> ServiceResult<String> {
    required_text(body.email.as_deref())
        .ok_or_else(|| ServiceError::Validation("E-mail é obrigatório.".to_string()))
}

/// Approve a pending registration: create the identity, insert the profile,
/// drop the pending row and email the temporary password.
///
/// The steps are not atomic. If the profile insert fails, the identity that
/// was just created is left in the auth service.
pub async fn approve_user(services: &Services, bearer: Option<&str>, body: &ApproveUserRequest) -> ProvisioningReport {
    let mut run = WorkflowRun::new("approve-user", APPROVAL_STEPS);

    let prepared = async {
        let input = validate_approval(body)?;
        authorize(AccessPolicy::PublicKey, bearer, &services.config, services.identity.as_ref()).await?;
        let mailer = services.mailer()?;
        Ok::<_, ServiceError>((input, mailer))
    }
    .await;
    let (input, mailer) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => return ProvisioningReport::rejected(run, err),
    };

    tracing::info!("Approving registration for {} (nivel {})", input.email, u8::from(input.nivel));
    let password = generate_temporary_password(TEMPORARY_PASSWORD_LENGTH);

    let outcome: ServiceResult<Provisioned> = async {
        let user = run
            .required(&CREATE_IDENTITY, async {
                services
                    .identity
                    .create_user(&input.email, &password)
                    .await
                    .map_err(|e| e.with_context("Erro ao criar usuário no Auth: "))
            })
            .await?;

        let record = UserRecord {
            id: user.id.clone(),
            nome: input.nome.clone(),
            email: input.email.clone(),
            celular: input.celular.clone(),
            funcao: input.funcao.clone(),
            id_filial: input.id_filial.clone(),
            nivel: input.nivel.into(),
            status: "ativo".to_string(),
            senha_temporaria: true,
        };
        run.required(&INSERT_PROFILE, async {
            services
                .store
                .insert_user(&record)
                .await
                .map_err(|e| e.with_context("Erro ao inserir usuário na tabela usuarios: "))
        })
        .await?;

        run.best_effort(&DELETE_PENDING, services.store.delete_pending_registration(&input.email))
            .await;

        let message = welcome_email(&services.config.branding, &input.nome, &input.email, &password);
        run.required(&SEND_WELCOME, async {
            mailer
                .send(&message)
                .await
                .map_err(|e| e.with_context("Falha ao enviar e-mail de boas-vindas: "))
        })
        .await?;

        Ok::<_, ServiceError>(Provisioned {
            message: APPROVED_MESSAGE,
            user_id: Some(user.id),
        })
    }
    .await;

    ProvisioningReport::finish(run, outcome)
}

/// Replace the caller's temporary password and clear the temporary flag.
pub async fn set_permanent_password(
    services: &Services,
    bearer: Option<&str>,
    body: &SetPasswordRequest,
) -> ProvisioningReport {
    let mut run = WorkflowRun::new("set-permanent-password", SET_PASSWORD_STEPS);

    let prepared = async {
        let password = body
            .nova_senha
            .clone()
            .filter(|p| p.chars().count() >= MIN_PASSWORD_LENGTH)
            .ok_or_else(|| {
                ServiceError::Validation("A nova senha deve ter pelo menos 6 caracteres".to_string())
            })?;
        let user = require_session(bearer, &services.config, services.identity.as_ref()).await?;
        Ok::<_, ServiceError>((password, user))
    }
    .await;
    let (password, user) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => return ProvisioningReport::rejected(run, err),
    };

    let outcome: ServiceResult<Provisioned> = async {
        run.required(&UPDATE_PASSWORD, async {
            services
                .identity
                .update_password(&user.id, &password)
                .await
                .map_err(|e| e.with_context("Erro ao atualizar senha: "))
        })
        .await?;

        run.required(&CLEAR_TEMPORARY_FLAG, async {
            services
                .store
                .set_temporary_password(&UserKey::Id(user.id.clone()), false)
                .await
                .map_err(|e| e.with_context("Erro ao atualizar usuário: "))
        })
        .await?;

        Ok::<_, ServiceError>(Provisioned {
            message: PASSWORD_SET_MESSAGE,
            user_id: None,
        })
    }
    .await;

    ProvisioningReport::finish(run, outcome)
}

/// Administrator reset: issue a new temporary password and email it.
pub async fn reset_password(services: &Services, bearer: Option<&str>, body: &EmailOnlyRequest) -> ProvisioningReport {
    let mut run = WorkflowRun::new("reset-password", RESET_STEPS);

    let prepared = async {
        let email = validate_email_only(body)?;
        authorize(AccessPolicy::PublicKey, bearer, &services.config, services.identity.as_ref()).await?;
        let mailer = services.mailer()?;
        Ok::<_, ServiceError>((email, mailer))
    }
    .await;
    let (email, mailer) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => return ProvisioningReport::rejected(run, err),
    };

    let outcome: ServiceResult<Provisioned> = async {
        let user = run
            .required(&FIND_IDENTITY, async {
                services
                    .identity
                    .find_user_by_email(&email)
                    .await
                    .map_err(|e| e.with_context("Erro ao buscar usuário: "))?
                    .ok_or_else(|| ServiceError::NotFound("Usuário não encontrado.".to_string()))
            })
            .await?;

        let password = generate_temporary_password(TEMPORARY_PASSWORD_LENGTH);
        run.required(&RESET_PASSWORD, async {
            services
                .identity
                .update_password(&user.id, &password)
                .await
                .map_err(|e| e.with_context("Erro ao redefinir senha: "))
        })
        .await?;

        run.required(&MARK_TEMPORARY_FLAG, async {
            services
                .store
                .set_temporary_password(&UserKey::Email(email.clone()), true)
                .await
                .map_err(|e| e.with_context("Erro ao atualizar flag no banco: "))
        })
        .await?;

        let message = password_reset_email(&services.config.branding, &email, &password);
        run.required(&SEND_NEW_PASSWORD, async {
            mailer
                .send(&message)
                .await
                .map_err(|e| e.with_context("Erro ao enviar e-mail: "))
        })
        .await?;

        Ok::<_, ServiceError>(Provisioned {
            message: PASSWORD_RESET_MESSAGE,
            user_id: Some(user.id),
        })
    }
    .await;

    ProvisioningReport::finish(run, outcome)
}

/// A user asks for a reset: flag the profile and notify every administrator.
pub async fn request_password_reset(
    services: &Services,
    bearer: Option<&str>,
    body: &EmailOnlyRequest,
) -> ProvisioningReport {
    let mut run = WorkflowRun::new("request-password-reset", RESET_REQUEST_STEPS);

    let prepared = async {
        let email = validate_email_only(body)?;
        authorize(AccessPolicy::PublicKey, bearer, &services.config, services.identity.as_ref()).await?;
        let mailer = services.mailer()?;
        Ok::<_, ServiceError>((email, mailer))
    }
    .await;
    let (email, mailer) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => return ProvisioningReport::rejected(run, err),
    };

    let outcome: ServiceResult<Provisioned> = async {
        let profile = run
            .required(&FIND_PROFILE, async {
                services
                    .store
                    .find_profile_by_email(&email)
                    .await
                    .map_err(|e| e.with_context("Erro ao buscar usuário: "))?
                    .ok_or_else(|| ServiceError::NotFound("Usuário não encontrado.".to_string()))
            })
            .await?;

        run.required(&FLAG_RESET_REQUEST, async {
            services
                .store
                .flag_password_reset_request(&email)
                .await
                .map_err(|e| e.with_context("Erro ao registrar solicitação: "))
        })
        .await?;

        let admins = run
            .required(&COLLECT_ADMINS, async {
                let admins = services
                    .store
                    .admin_emails()
                    .await
                    .map_err(|e| e.with_context("Erro ao buscar administradores: "))?;
                if admins.is_empty() {
                    return Err(ServiceError::NotFound("Nenhum administrador encontrado.".to_string()));
                }
                Ok(admins)
            })
            .await?;

        let message = reset_request_email(&services.config.branding, admins, &profile);
        run.required(&NOTIFY_ADMINS, async {
            mailer
                .send(&message)
                .await
                .map_err(|e| e.with_context("Erro ao enviar e-mail: "))
        })
        .await?;

        Ok::<_, ServiceError>(Provisioned {
            message: RESET_REQUESTED_MESSAGE,
            user_id: None,
        })
    }
    .await;

    ProvisioningReport::finish(run, outcome)
}

pub async fn handle_approve_user(services: &Services, request: &HttpRequest) -> ServiceResult<HttpResponse> {
    let body: ApproveUserRequest = request.json_body()?;
    approve_user(services, request.bearer_token(), &body).await.into_response()
}

pub async fn handle_set_permanent_password(services: &Services, request: &HttpRequest) -> ServiceResult<HttpResponse> {
    let body: SetPasswordRequest = request.json_body()?;
    set_permanent_password(services, request.bearer_token(), &body)
        .await
        .into_response()
}

pub async fn handle_reset_password(services: &Services, request: &HttpRequest) -> ServiceResult<HttpResponse> {
    let body: EmailOnlyRequest = request.json_body()?;
    reset_password(services, request.bearer_token(), &body).await.into_response()
}

pub async fn handle_request_password_reset(services: &Services, request: &HttpRequest) -> ServiceResult<HttpResponse> {
    let body: EmailOnlyRequest = request.json_body()?;
    request_password_reset(services, request.bearer_token(), &body)
        .await
        .into_response()
}
