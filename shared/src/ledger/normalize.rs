use chrono::{DateTime, Utc};

use crate::models::RawMovement;
use crate::utils::{coerce_quantity, non_blank, parse_timestamp};

/// One ledger entry with every quantity coerced to a finite, non-negative number.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRecord {
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw timestamp text, kept for rows whose timestamp could not be parsed.
    pub timestamp_text: String,
    pub product: Option<String>,
    pub label: String,
    pub in_ambient: f64,
    pub in_standard: f64,
    pub out_ambient: f64,
    pub out_standard: f64,
}

impl MovementRecord {
    pub fn from_raw(raw: &RawMovement) -> Self {
        let timestamp_text = raw.data_mov.clone().unwrap_or_default();

        Self {
            timestamp: parse_timestamp(&timestamp_text),
            timestamp_text,
            product: raw
                .produtos
                .as_ref()
                .and_then(|p| p.nome.clone()),
            label: resolve_label(raw.cliente.as_deref(), raw.descricao.as_deref()),
            in_ambient: coerce_quantity(raw.entrada_amb.as_ref()),
            in_standard: coerce_quantity(raw.entrada_vinte.as_ref()),
            out_ambient: coerce_quantity(raw.saida_amb.as_ref()),
            out_standard: coerce_quantity(raw.saida_vinte.as_ref()),
        }
    }

    pub fn net_ambient(&self) -> f64 {
        self.in_ambient - self.out_ambient
    }

    pub fn net_standard(&self) -> f64 {
        self.in_standard - self.out_standard
    }

    /// `dd/mm/yyyy`, or the raw text when the timestamp did not parse.
    pub fn date_label(&self) -> String {
        match self.timestamp {
            Some(ts) => ts.format("%d/%m/%Y").to_string(),
            None => self.timestamp_text.clone(),
        }
    }
}

/// Trimmed primary label when it has content, else the fallback verbatim, else empty.
pub fn resolve_label(primary: Option<&str>, fallback: Option<&str>) -> String {
    match non_blank(primary) {
        Some(label) => label.to_string(),
        None => fallback.unwrap_or_default().to_string(),
    }
}

pub fn normalize_all(raw: &[RawMovement]) -> Vec<MovementRecord> {
    raw.iter().map(MovementRecord::from_raw).collect()
}
