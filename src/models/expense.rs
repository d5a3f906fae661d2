use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Input fields of the expense form, serialized with the names the form client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimField {
    #[serde(rename = "applicant")]
    Applicant,
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "amount")]
    Amount,
    #[serde(rename = "receiptImage")]
    ReceiptImage,
}

impl ClaimField {
    /// Canonical order, also the order of `errorFields` in responses.
    pub const ALL: [ClaimField; 4] = [
        ClaimField::Applicant,
        ClaimField::Title,
        ClaimField::Amount,
        ClaimField::ReceiptImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimField::Applicant => "applicant",
            ClaimField::Title => "title",
            ClaimField::Amount => "amount",
            ClaimField::ReceiptImage => "receiptImage",
        }
    }
}

impl std::fmt::Display for ClaimField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploaded receipt photo, held in memory for the duration of one request.
#[derive(Debug, Clone)]
pub struct ReceiptImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl ReceiptImage {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A complete claim: every field present and the amount parsed.
#[derive(Debug, Clone)]
pub struct ExpenseClaim {
    pub applicant: String,
    pub title: String,
    pub amount_minor_units: u64,
    pub receipt: ReceiptImage,
}

/// Raw multipart submission of the form, any field may be absent.
#[derive(Debug, Default)]
pub struct ClaimForm {
    pub applicant: Option<String>,
    pub title: Option<String>,
    pub amount: Option<String>,
    pub receipt: Option<ReceiptImage>,
    /// Why the uploaded receipt was refused, when it was not an image.
    pub receipt_error: Option<String>,
}

impl ClaimForm {
    /// Fields that are absent or blank, in canonical order. A refused
    /// receipt upload counts as missing.
    pub fn missing_fields(&self) -> Vec<ClaimField> {
        ClaimField::ALL
            .into_iter()
            .filter(|field| match field {
                ClaimField::Applicant => is_blank(self.applicant.as_deref()),
                ClaimField::Title => is_blank(self.title.as_deref()),
                ClaimField::Amount => is_blank(self.amount.as_deref()),
                ClaimField::ReceiptImage => {
                    self.receipt_error.is_some()
                        || self.receipt.as_ref().map(|r| r.is_empty()).unwrap_or(true)
                }
            })
            .collect()
    }

    /// Promotes the form to a claim, or returns the fields the user has to fix.
    ///
    /// A present amount that is not an integer is reported alongside the missing ones.
    pub fn into_claim(self) -> Result<ExpenseClaim, Vec<ClaimField>> {
        let mut invalid = self.missing_fields();

        let amount = self.amount.as_deref().and_then(parse_amount);
        if amount.is_none() && !invalid.contains(&ClaimField::Amount) {
            invalid.push(ClaimField::Amount);
            invalid.sort_by_key(|f| ClaimField::ALL.iter().position(|x| x == f));
        }

        match (self.applicant, self.title, amount, self.receipt) {
            (Some(applicant), Some(title), Some(amount_minor_units), Some(receipt))
                if invalid.is_empty() =>
            {
                Ok(ExpenseClaim {
                    applicant: applicant.trim().to_string(),
                    title: title.trim().to_string(),
                    amount_minor_units,
                    receipt,
                })
            }
            _ => Err(invalid),
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Parses a user-entered amount such as `12,345` into minor units.
pub fn parse_amount(raw: &str) -> Option<u64> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '，')
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Body of the JSON-mode check. Fields may be blank; judging them is the model's job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckExpenseRequest {
    #[serde(default)]
    pub applicant: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub amount: AmountInput,
}

/// The amount arrives as a JSON number or as the formatted text of the input box.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(u64),
    Text(String),
}

impl Default for AmountInput {
    fn default() -> Self {
        AmountInput::Text(String::new())
    }
}

impl std::fmt::Display for AmountInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmountInput::Number(n) => write!(f, "{}", n),
            AmountInput::Text(s) => f.write_str(s.trim()),
        }
    }
}

/// Outcome of reading the total off a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptReadResult {
    Amount(u64),
    Unreadable { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Success,
    Error,
}

/// Verdict of the JSON-mode expense check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
}

// Keyword table for `implicated_fields`. Matching prose is fragile; it only
// mirrors what the form client highlights.
const FIELD_KEYWORDS: &[(ClaimField, &[&str])] = &[
    (ClaimField::Applicant, &["申請者", "applicant"]),
    (ClaimField::Title, &["タイトル", "件名", "title"]),
    (ClaimField::Amount, &["金額", "amount"]),
    (ClaimField::ReceiptImage, &["領収書", "receipt"]),
];

impl CheckResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            message: message.into(),
        }
    }

    /// Fields whose keywords appear in the message. Only meaningful for `error` results.
    pub fn implicated_fields(&self) -> Vec<ClaimField> {
        if self.status == CheckStatus::Success {
            return Vec::new();
        }
        let lowered = self.message.to_lowercase();
        FIELD_KEYWORDS
            .iter()
            .filter(|(_, words)| words.iter().any(|w| lowered.contains(w)))
            .map(|(field, _)| *field)
            .collect()
    }
}
