use crate::errors::ValidationError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

/// Opaque record identifier. Remote tables may hand out integers, so both
/// forms are accepted on read and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(text_or_number(deserializer)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(rename = "tanggal")]
    pub date: NaiveDate,
    #[serde(rename = "deskripsi", default)]
    pub description: Option<String>,
    #[serde(rename = "jumlah", with = "amount")]
    pub amount: Decimal,
}

/// A record before a backend has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTransaction {
    #[serde(rename = "tanggal")]
    pub date: NaiveDate,
    #[serde(rename = "deskripsi")]
    pub description: Option<String>,
    #[serde(rename = "jumlah", with = "amount")]
    pub amount: Decimal,
}

impl NewTransaction {
    pub fn with_id(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            date: self.date,
            description: self.description,
            amount: self.amount,
        }
    }
}

/// Field overwrite applied by id. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionPatch {
    #[serde(rename = "tanggal", skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "deskripsi", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        rename = "jumlah",
        skip_serializing_if = "Option::is_none",
        serialize_with = "amount::serialize_option"
    )]
    pub amount: Option<Decimal>,
}

impl TransactionPatch {
    pub fn apply(&self, transaction: &mut Transaction) {
        if let Some(date) = self.date {
            transaction.date = date;
        }
        if let Some(description) = &self.description {
            transaction.description = non_empty(description);
        }
        if let Some(amount) = self.amount {
            transaction.amount = amount;
        }
    }
}

/// Add form, shared by the HTML form post and the JSON API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionForm {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "optional_text_or_number")]
    pub amount: Option<String>,
}

impl TransactionForm {
    pub fn validate(&self) -> Result<NewTransaction, ValidationError> {
        Ok(NewTransaction {
            date: parse_date(&self.date)?,
            description: non_empty(&self.description),
            amount: parse_amount(self.amount.as_deref().unwrap_or_default())?,
        })
    }
}

/// Answers to the edit prompts. A missing or blank amount means the edit was
/// cancelled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditForm {
    #[serde(default, deserialize_with = "optional_text_or_number")]
    pub amount: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteForm {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Local,
    Remote,
}

impl BackendMode {
    pub fn label(self) -> &'static str {
        match self {
            BackendMode::Local => "localStorage",
            BackendMode::Remote => "Supabase (realtime)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    #[serde(with = "amount")]
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub id: TransactionId,
    pub date: NaiveDate,
    pub description: String,
    #[serde(with = "amount")]
    pub amount: Decimal,
    pub amount_display: String,
    pub editable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub privileged: bool,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub mode: BackendMode,
    pub mode_label: &'static str,
    pub session: SessionResponse,
    pub revision: u64,
    #[serde(with = "amount")]
    pub total: Decimal,
    pub total_display: String,
    pub series: Vec<SeriesPoint>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingDate);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(value.to_string()))
}

/// Coerces user or wire text into an amount. Accepts plain and scientific
/// notation; anything else is rejected.
pub fn parse_amount(value: &str) -> Result<Decimal, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::InvalidAmount(String::new()));
    }
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| ValidationError::InvalidAmount(value.to_string()))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

impl TextOrNumber {
    fn into_text(self) -> String {
        match self {
            TextOrNumber::Text(text) => text,
            TextOrNumber::Number(number) => number.to_string(),
        }
    }
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(TextOrNumber::deserialize(deserializer)?.into_text())
}

fn optional_text_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<TextOrNumber>::deserialize(deserializer)?.map(TextOrNumber::into_text))
}

/// Amounts travel as JSON numbers; whole values are written as integers.
/// Numeric strings are coerced on read.
pub(crate) mod amount {
    use super::{parse_amount, text_or_number};
    use rust_decimal::{prelude::ToPrimitive, Decimal};
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        if value.fract().is_zero() {
            if let Some(whole) = value.to_i64() {
                return serializer.serialize_i64(whole);
            }
        }
        match value.to_f64() {
            Some(float) => serializer.serialize_f64(float),
            None => serializer.serialize_str(&value.to_string()),
        }
    }

    pub fn serialize_option<S: Serializer>(
        value: &Option<Decimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let text = text_or_number(deserializer)?;
        parse_amount(&text).map_err(de::Error::custom)
    }
}
