use async_trait::async_trait;
use chrono::Datelike;
use reqwest::Client;
use serde::Deserialize;

use crate::services::upstream_message;
use crate::utils::escape_html;
use crate::{AppConfig, Branding, EmailMessage, Mailer, ServiceError, ServiceResult, UserSummary};

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Service for sending HTML emails through the transactional email API
pub struct EmailService {
    client: Client,
    api_url: String,
    api_key: String,
}

impl EmailService {
    pub fn new(client: Client, api_url: String, api_key: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }

    /// Fails when the function was started without email credentials.
    pub fn from_config(client: Client, config: &AppConfig) -> ServiceResult<Self> {
        let settings = config.email_settings()?;
        Ok(Self::new(client, settings.api_url.clone(), settings.api_key.clone()))
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send(&self, message: &EmailMessage) -> ServiceResult<String> {
        tracing::info!(
            "Sending email - Subject: {}, Recipients: {}, From: {}",
            message.subject,
            message.to.join(", "),
            message.from
        );

        let response = self
            .client
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("❌ Email API unreachable: {}", e);
                ServiceError::Email(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Email(e.to_string()))?;

        if !status.is_success() {
            tracing::error!(
                "❌ Email API call failed - Status: {}, Recipients: {}, Body: {}",
                status.as_u16(),
                message.to.join(", "),
                body
            );
            return Err(ServiceError::Email(upstream_message(status.as_u16(), &body)));
        }

        let message_id = serde_json::from_str::<SendResponse>(&body)
            .ok()
            .and_then(|r| r.id)
            .unwrap_or_default();

        tracing::info!(
            "✅ Email sent successfully - Message ID: {}, Subject: {}",
            message_id,
            message.subject
        );
        Ok(message_id)
    }
}

fn layout(branding: &Branding, content: &str) -> String {
    let app_name = escape_html(&branding.app_name);
    format!(
        r#"<div style="font-family:Arial,sans-serif;color:#222;">
{content}
<p style="margin: 30px 0;">
  <a href="{url}" style="background-color:#0A4B78; color:#fff; padding:14px 28px; border-radius:8px; text-decoration:none; font-weight:bold;">Acessar o {app_name}</a>
</p>
<hr>
<p style="font-size:12px; color:#888;">{app_name} Terminais {year}, All rights reserved.</p>
</div>"#,
        content = content,
        url = escape_html(&branding.app_url),
        app_name = app_name,
        year = chrono::Utc::now().year(),
    )
}

/// Account approved: carries the generated temporary password.
pub fn welcome_email(branding: &Branding, nome: &str, email: &str, temporary_password: &str) -> EmailMessage {
    let app_name = escape_html(&branding.app_name);
    let content = format!(
        r#"<h2>Bem-vindo(a) ao {app_name}!</h2>
<p>Olá {nome},</p>
<p>Sua conta foi aprovada com sucesso e já está ativa!</p>
<p>Use os dados abaixo para acessar o sistema:</p>
<p><strong>E-mail:</strong> {email}</p>
<p><strong>Senha temporária:</strong> <b style="font-size:18px;">{password}</b></p>
<p>Você será solicitado a alterar essa senha no primeiro login.</p>"#,
        app_name = app_name,
        nome = escape_html(nome),
        email = escape_html(email),
        password = escape_html(temporary_password),
    );

    EmailMessage {
        from: branding.from_email.clone(),
        to: vec![email.to_string()],
        subject: format!("Acesso liberado - {}", branding.app_name),
        html: layout(branding, &content),
    }
}

/// Password reset by an administrator.
pub fn password_reset_email(branding: &Branding, email: &str, temporary_password: &str) -> EmailMessage {
    let content = format!(
        r#"<h2>🔑 Sua senha foi redefinida</h2>
<p>Olá,</p>
<p>Sua senha do <strong>{app_name}</strong> foi redefinida pelo administrador.</p>
<p>Nova senha temporária:</p>
<p style="font-size:18px;"><b>{password}</b></p>
<p>Você deverá alterá-la assim que acessar o sistema.</p>"#,
        app_name = escape_html(&branding.app_name),
        password = escape_html(temporary_password),
    );

    EmailMessage {
        from: branding.from_email.clone(),
        to: vec![email.to_string()],
        subject: format!("🔐 Sua senha foi redefinida - {}", branding.app_name),
        html: layout(branding, &content),
    }
}

/// Notice to administrators that a user asked for a reset.
pub fn reset_request_email(branding: &Branding, admins: Vec<String>, user: &UserSummary) -> EmailMessage {
    let content = format!(
        r#"<h2>🔔 Solicitação de redefinição de senha</h2>
<p>O usuário <strong>{nome}</strong> pediu redefinição de senha.</p>
<p>E-mail: <b>{email}</b></p>"#,
        nome = escape_html(&user.nome),
        email = escape_html(&user.email),
    );

    EmailMessage {
        from: branding.from_email.clone(),
        to: admins,
        subject: "🔔 Solicitação de redefinição de senha".to_string(),
        html: layout(branding, &content),
    }
}
