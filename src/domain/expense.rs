use crate::error::{AccrualError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Store-assigned identifier of an expense.
///
/// The store is free to hand out numeric or textual ids; both are kept in
/// their original shape so they round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpenseId {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl FromStr for ExpenseId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(s.parse::<u64>()
            .map(Self::Numeric)
            .unwrap_or_else(|_| Self::Text(s.to_string())))
    }
}

impl From<u64> for ExpenseId {
    fn from(id: u64) -> Self {
        Self::Numeric(id)
    }
}

/// How often an expense recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "One-Time")]
    OneTime,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub const ALL: [Frequency; 6] = [
        Self::OneTime,
        Self::Daily,
        Self::Weekly,
        Self::Monthly,
        Self::Quarterly,
        Self::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "One-Time",
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::Yearly => "Yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = AccrualError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| AccrualError::InvalidRecord(format!("unknown frequency '{s}'")))
    }
}

/// Frequency as found on a stored record.
///
/// Records written by other clients may carry values outside the known set.
/// Those must not break the listing, so they are kept verbatim and rejected
/// later, per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordFrequency {
    Known(Frequency),
    Unrecognized(String),
}

impl From<Value> for RecordFrequency {
    fn from(raw: Value) -> Self {
        match raw {
            Value::String(name) => match name.parse() {
                Ok(frequency) => Self::Known(frequency),
                Err(_) => Self::Unrecognized(name),
            },
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// Wire shape of a stored record before its fields are checked.
#[derive(Deserialize)]
struct RawExpenseRecord {
    id: ExpenseId,
    #[serde(default)]
    base: Value,
    #[serde(default)]
    amount: Value,
    #[serde(default)]
    frequency: Value,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

/// Reads a JSON number or numeric string as a decimal. `null` is unset.
fn decimal_field(name: &str, raw: &Value) -> std::result::Result<Option<Decimal>, String> {
    let parsed = match raw {
        Value::Null => return Ok(None),
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text))
        }
        Value::String(text) => Decimal::from_str(text.trim()),
        other => return Err(format!("{name} is not a number: {other}")),
    };
    parsed
        .map(Some)
        .map_err(|e| format!("{name} {raw} is not a representable amount: {e}"))
}

/// An expense as held by the record store.
///
/// Deserialization never fails on a badly typed `base`, `amount` or
/// `frequency`: the field is left unset and the problem is kept, so one bad
/// record cannot spoil a whole listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawExpenseRecord")]
pub struct ExpenseRecord {
    pub id: ExpenseId,
    /// Nominal periodic amount.
    #[serde(serialize_with = "rust_decimal::serde::float_option::serialize")]
    pub base: Option<Decimal>,
    /// Accumulated amount. Unset is read as zero.
    #[serde(serialize_with = "rust_decimal::serde::float_option::serialize")]
    pub amount: Option<Decimal>,
    pub frequency: Option<RecordFrequency>,
    /// Any other attributes the store keeps (name, timestamps, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
    #[serde(skip)]
    defects: Vec<String>,
}

impl From<RawExpenseRecord> for ExpenseRecord {
    fn from(raw: RawExpenseRecord) -> Self {
        let mut defects = Vec::new();
        let mut decimal = |name: &str, value: &Value| {
            decimal_field(name, value).unwrap_or_else(|defect| {
                defects.push(defect);
                None
            })
        };
        let base = decimal("base", &raw.base);
        let amount = decimal("amount", &raw.amount);
        let frequency = match raw.frequency {
            Value::Null => None,
            value => Some(RecordFrequency::from(value)),
        };

        Self {
            id: raw.id,
            base,
            amount,
            frequency,
            attributes: raw.attributes,
            defects,
        }
    }
}

impl ExpenseRecord {
    pub fn new(id: ExpenseId, base: Decimal, amount: Decimal, frequency: Frequency) -> Self {
        Self {
            id,
            base: Some(base),
            amount: Some(amount),
            frequency: Some(RecordFrequency::Known(frequency)),
            attributes: Map::new(),
            defects: Vec::new(),
        }
    }

    /// Fails if any field could not be read when the record was parsed.
    pub fn ensure_well_formed(&self) -> Result<()> {
        if self.defects.is_empty() {
            return Ok(());
        }
        Err(AccrualError::InvalidRecord(format!(
            "expense {} is malformed: {}",
            self.id,
            self.defects.join("; ")
        )))
    }

    pub fn is_one_time(&self) -> bool {
        matches!(
            self.frequency,
            Some(RecordFrequency::Known(Frequency::OneTime))
        )
    }

    /// The record's frequency, if it is one we know how to accrue.
    pub fn frequency(&self) -> Result<Frequency> {
        match &self.frequency {
            Some(RecordFrequency::Known(frequency)) => Ok(*frequency),
            Some(RecordFrequency::Unrecognized(raw)) => Err(AccrualError::InvalidRecord(format!(
                "expense {} has unknown frequency '{raw}'",
                self.id
            ))),
            None => Err(AccrualError::InvalidRecord(format!(
                "expense {} has no frequency",
                self.id
            ))),
        }
    }

    pub fn current_amount(&self) -> Decimal {
        self.amount.unwrap_or(Decimal::ZERO)
    }
}

/// Body of a list response.
///
/// Some stores return the records directly, others wrap them in `data`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExpenseListing {
    Bare(Vec<ExpenseRecord>),
    Envelope { data: Vec<ExpenseRecord> },
}

impl ExpenseListing {
    pub fn into_records(self) -> Vec<ExpenseRecord> {
        match self {
            Self::Bare(records) | Self::Envelope { data: records } => records,
        }
    }
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    #[serde(with = "rust_decimal::serde::float")]
    pub base: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub frequency: Frequency,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Partial update of an expense. Unset fields are left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseUpdate {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub base: Option<Decimal>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
}

impl ExpenseUpdate {
    pub fn amount(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, record: &mut ExpenseRecord) {
        if let Some(base) = self.base {
            record.base = Some(base);
        }
        if let Some(amount) = self.amount {
            record.amount = Some(amount);
        }
        if let Some(frequency) = self.frequency {
            record.frequency = Some(RecordFrequency::Known(frequency));
        }
    }
}
