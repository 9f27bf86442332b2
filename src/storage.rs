use crate::models::{MemberRecord, PaymentRecord};
use csv::StringRecord;
use std::collections::HashMap;
use std::{env, fmt, io, path::PathBuf};
use tokio::fs;
use tracing::debug;

/// Payments export read by the revenue endpoints.
pub const PAYMENTS_FILE: &str = "dataprimo.csv";

/// Membership exports a caller may select via the `file` query parameter.
/// Anything outside this list is rejected before touching the filesystem.
pub const MEMBER_FILES: [&str; 2] = ["membersbeta.csv", "membersalpha.csv"];

#[derive(Debug)]
pub enum StorageError {
    /// None of the candidate directories yielded a readable file. Carries
    /// the last underlying I/O error, if any read was attempted.
    FileNotFound {
        filename: String,
        last_error: Option<io::Error>,
    },
    Csv(csv::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::FileNotFound {
                filename,
                last_error,
            } => match last_error {
                Some(err) => write!(
                    f,
                    "could not find {filename} in any of the expected locations (last error: {err})"
                ),
                None => write!(f, "could not find {filename} in any of the expected locations"),
            },
            StorageError::Csv(err) => write!(f, "failed to parse csv: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<csv::Error> for StorageError {
    fn from(err: csv::Error) -> Self {
        StorageError::Csv(err)
    }
}

/// Ordered list of directories probed for data files. `APP_DATA_DIRS`
/// (colon-separated) overrides the built-in list; the defaults cover local
/// runs plus the serverless and container deployments, whose working
/// directories differ.
pub fn search_dirs() -> Vec<PathBuf> {
    if let Ok(raw) = env::var("APP_DATA_DIRS") {
        return raw.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect();
    }

    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    vec![
        cwd.join("public"),
        cwd,
        PathBuf::from("/var/task/public"),
        PathBuf::from("/app/public"),
    ]
}

/// Reads `filename` from the first candidate directory that has it.
pub async fn read_table(dirs: &[PathBuf], filename: &str) -> Result<String, StorageError> {
    let mut last_error = None;
    for dir in dirs {
        let path = dir.join(filename);
        match fs::read_to_string(&path).await {
            Ok(text) => return Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => last_error = Some(err),
        }
    }

    Err(StorageError::FileNotFound {
        filename: filename.to_string(),
        last_error,
    })
}

pub async fn load_payments(dirs: &[PathBuf], filename: &str) -> Result<Vec<PaymentRecord>, StorageError> {
    let text = read_table(dirs, filename).await?;
    parse_payments(&text)
}

pub async fn load_members(dirs: &[PathBuf], filename: &str) -> Result<Vec<MemberRecord>, StorageError> {
    let text = read_table(dirs, filename).await?;
    parse_members(&text)
}

/// Header-name to column-index map, so exports with reordered columns
/// parse the same.
struct ColumnMap {
    index: HashMap<String, usize>,
}

impl ColumnMap {
    fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Self { index }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn field<'a>(&self, record: &'a StringRecord, name: &str) -> &'a str {
        self.position(name)
            .and_then(|i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }
}

/// Parses a money field: strips `$`, thousands separators and stray quote
/// characters before the numeric conversion.
fn money(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',' | '"')).collect();
    cleaned.trim().parse().ok()
}

fn yes(raw: &str) -> bool {
    raw.trim_matches('"').trim() == "Yes"
}

/// Optional Yes/blank column: read it when the export has it, otherwise use
/// the variant fallback.
fn opt_flag(record: &StringRecord, position: Option<usize>, fallback: bool) -> bool {
    match position {
        Some(i) => yes(record.get(i).unwrap_or("")),
        None => fallback,
    }
}

pub fn parse_payments(text: &str) -> Result<Vec<PaymentRecord>, StorageError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = ColumnMap::new(reader.headers()?);

    let mut out = Vec::new();
    for row in reader.records() {
        let record = row?;
        let amount_raw = columns.field(&record, "Payment Amount");
        let Some(payment_amount) = money(amount_raw) else {
            debug!("dropping payment row with unparseable amount {amount_raw:?}");
            continue;
        };
        let transaction_amount =
            money(columns.field(&record, "Transaction Amount")).unwrap_or(payment_amount);

        out.push(PaymentRecord {
            invoice_number: columns.field(&record, "Invoice Number").to_string(),
            invoice_due_date: columns.field(&record, "Invoice Due Date").to_string(),
            transaction_at: columns.field(&record, "Transaction At").to_string(),
            transaction_amount,
            payment_amount,
            currency: columns.field(&record, "Currency Code").to_string(),
            payer_home_location: columns.field(&record, "Payer Home Location").to_string(),
        });
    }

    Ok(out)
}

pub fn parse_members(text: &str) -> Result<Vec<MemberRecord>, StorageError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = ColumnMap::new(reader.headers()?);

    // Flag columns vary across export variants; resolve presence once.
    let used_first_visit = columns.position("Used for Client's First Visit?");
    let membership = columns.position("Membership?");
    let canceled = columns.position("Canceled?");
    let first_plan = columns.position("Client's First Pass/Plan?");
    let first_membership = columns.position("Client's First Membership?");

    let mut out = Vec::new();
    for row in reader.records() {
        let record = row?;
        let end_date = columns.field(&record, "End Date").trim_matches('"').to_string();

        out.push(MemberRecord {
            client: columns.field(&record, "Client").trim_matches('"').to_string(),
            plan_name: columns.field(&record, "Plan Name").trim_matches('"').to_string(),
            start_date: columns.field(&record, "Start Date").trim_matches('"').to_string(),
            used_for_first_visit: opt_flag(&record, used_first_visit, false),
            // Variant without a "Membership?" column: every row is a membership.
            membership: opt_flag(&record, membership, true),
            // Variant without a "Canceled?" column: a recorded end date is the
            // only cancellation signal. Plan expirations are indistinguishable
            // from true cancellations here.
            canceled: opt_flag(&record, canceled, !end_date.is_empty()),
            client_first_plan: opt_flag(&record, first_plan, false),
            client_first_membership: opt_flag(&record, first_membership, false),
            client_home_location: columns
                .field(&record, "Client's Home Location")
                .trim_matches('"')
                .to_string(),
            client_id: columns.field(&record, "Client ID").trim_matches('"').to_string(),
            plan_id: columns.field(&record, "Plan ID").trim_matches('"').to_string(),
            end_date,
        });
    }

    Ok(out)
}
