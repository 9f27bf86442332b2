use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
struct MonthlyRevenue {
    month: String,
    revenue: f64,
    count: u64,
}

#[derive(Debug, Deserialize)]
struct MonthlyAmountBreakdown {
    month: String,
    amounts: BTreeMap<String, f64>,
    total: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthlyMembership {
    month: String,
    membership_count: u64,
    new_memberships: u64,
    canceled_memberships: u64,
}

#[derive(Debug, Deserialize)]
struct MonthlyProgramBreakdown {
    month: String,
    programs: BTreeMap<String, u64>,
    total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationSeries<T> {
    all_data: Vec<T>,
    los_gatos_data: Vec<T>,
    pleasanton_data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct BreakdownResponse {
    breakdown: Vec<MonthlyAmountBreakdown>,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

const PAYMENTS_CSV: &str = "\
Invoice Number,Invoice Due Date,Transaction At,Transaction Amount,Payment Amount,Currency Code,Payer Home Location
INV-1,2023-02-01,2023-01-15 10:30:00,$50,$50,USD,Los Gatos Studio
INV-2,2023-02-01,2023-01-20 12:00:00,$30,$30,USD,Pleasanton Studio
INV-3,2023-03-01,2023-02-01 09:00:00,$20,$20,USD,Los Gatos Studio
INV-4,2021-05-01,2021-04-01 09:00:00,$99,$99,USD,Los Gatos Studio
";

const MEMBERS_BETA_CSV: &str = "\
Client,Plan Name,Start Date,End Date,Client's Home Location,Client ID,Plan ID
Ann,Unlimited,2023-01-10,,Los Gatos,c1,p1
Bob,Unlimited,2023-01-15,2023-02-05,Pleasanton,c2,p2
";

const MEMBERS_ALPHA_CSV: &str = "\
Client,Plan Name,Start Date,End Date,Used for Client's First Visit?,Membership?,Canceled?,Client's First Pass/Plan?,Client's First Membership?,Client's Home Location,Client ID,Plan ID
Ann,Unlimited,2023-01-10,,No,Yes,,No,Yes,Los Gatos,c1,p1
Cid,Drop-in,2023-01-12,,No,No,,No,No,Los Gatos,c3,p3
";

fn write_fixtures() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut dir = std::env::temp_dir();
    dir.push(format!("studio_metrics_http_{}_{}", std::process::id(), nanos));
    std::fs::create_dir_all(&dir).expect("create fixture dir");
    std::fs::write(dir.join("dataprimo.csv"), PAYMENTS_CSV).expect("write payments fixture");
    std::fs::write(dir.join("membersbeta.csv"), MEMBERS_BETA_CSV).expect("write beta fixture");
    std::fs::write(dir.join("membersalpha.csv"), MEMBERS_ALPHA_CSV).expect("write alpha fixture");
    dir
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/revenue-data")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let data_dir = write_fixtures();
    let child = Command::new(env!("CARGO_BIN_EXE_studio_metrics"))
        .env("PORT", port.to_string())
        .env("APP_DATA_DIRS", data_dir.as_os_str())
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

#[tokio::test]
async fn http_revenue_data_aggregates_per_location() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let series: LocationSeries<MonthlyRevenue> = client
        .get(format!("{}/api/revenue-data", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(series.all_data.len(), 2);
    assert_eq!(series.all_data[0].month, "2023-01");
    assert_eq!(series.all_data[0].revenue, 80.0);
    assert_eq!(series.all_data[0].count, 2);
    assert_eq!(series.all_data[1].month, "2023-02");
    assert_eq!(series.all_data[1].revenue, 20.0);

    assert_eq!(series.los_gatos_data[0].revenue, 50.0);
    assert_eq!(series.pleasanton_data.len(), 1);
    assert_eq!(series.pleasanton_data[0].revenue, 30.0);

    // The 2021 payment is legacy data and must not appear anywhere.
    assert!(series.all_data.iter().all(|m| !m.month.starts_with("2021")));
}

#[tokio::test]
async fn http_revenue_range_zero_fills_missing_months() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let series: LocationSeries<MonthlyRevenue> = client
        .get(format!(
            "{}/api/revenue-data?start=2023-01&end=2023-03",
            server.base_url
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let months: Vec<&str> = series.all_data.iter().map(|m| m.month.as_str()).collect();
    assert_eq!(months, vec!["2023-01", "2023-02", "2023-03"]);
    assert_eq!(series.all_data[2].revenue, 0.0);
    assert_eq!(series.all_data[2].count, 0);
}

#[tokio::test]
async fn http_amount_breakdown_totals_are_consistent() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response: BreakdownResponse = client
        .get(format!(
            "{}/api/revenue-data/amount-breakdown",
            server.base_url
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let january = &response.breakdown[0];
    assert_eq!(january.month, "2023-01");
    assert_eq!(january.amounts["50"], 50.0);
    assert_eq!(january.amounts["30"], 30.0);
    assert_eq!(january.total, january.amounts.values().sum::<f64>());

    let by_location: LocationSeries<MonthlyAmountBreakdown> = client
        .get(format!(
            "{}/api/revenue-data/amount-breakdown-by-location",
            server.base_url
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(by_location.all_data[0].total, 80.0);
    assert_eq!(by_location.los_gatos_data[0].total, 50.0);
}

#[tokio::test]
async fn http_membership_data_default_file() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let series: LocationSeries<MonthlyMembership> = client
        .get(format!("{}/api/membership-data", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(series.all_data.len(), 2);
    assert_eq!(series.all_data[0].month, "2023-01");
    assert_eq!(series.all_data[0].membership_count, 2);
    assert_eq!(series.all_data[0].new_memberships, 2);
    assert_eq!(series.all_data[1].membership_count, 1);
    assert_eq!(series.all_data[1].canceled_memberships, 1);

    // Bob's cancellation is inferred from the end date in the sparse variant.
    assert_eq!(series.pleasanton_data[1].membership_count, 0);
    assert_eq!(series.los_gatos_data.len(), 1);
    assert_eq!(series.los_gatos_data[0].membership_count, 1);
}

#[tokio::test]
async fn http_membership_data_alpha_variant_respects_membership_flag() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let series: LocationSeries<MonthlyMembership> = client
        .get(format!(
            "{}/api/membership-data?file=membersalpha.csv",
            server.base_url
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Cid's row is marked Membership? = No and must not count.
    assert_eq!(series.all_data.len(), 1);
    assert_eq!(series.all_data[0].membership_count, 1);
    assert_eq!(series.all_data[0].new_memberships, 1);
}

#[tokio::test]
async fn http_membership_program_breakdown_totals() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let series: LocationSeries<MonthlyProgramBreakdown> = client
        .get(format!(
            "{}/api/membership-program-breakdown?file=membersbeta.csv",
            server.base_url
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(series.all_data[0].month, "2023-01");
    assert_eq!(series.all_data[0].programs["Unlimited"], 2);
    assert_eq!(series.all_data[0].total, 2);
    assert_eq!(series.all_data[1].programs["Unlimited"], 1);
    assert_eq!(series.all_data[1].total, 1);
}

#[tokio::test]
async fn http_membership_wire_format_uses_camel_case() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let body: serde_json::Value = client
        .get(format!("{}/api/membership-data", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let all_data = body["allData"].as_array().expect("allData array");
    assert_eq!(
        all_data[0],
        serde_json::json!({
            "month": "2023-01",
            "membershipCount": 2,
            "newMemberships": 2,
            "canceledMemberships": 0
        })
    );
    assert!(body["losGatosData"].is_array());
    assert!(body["pleasantonData"].is_array());
}

#[tokio::test]
async fn http_invalid_file_parameter_is_rejected() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .get(format!(
            "{}/api/membership-data?file=../../etc/passwd",
            server.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = client
        .get(format!(
            "{}/api/membership-program-breakdown?file=unknown.csv",
            server.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_mismatched_range_bounds_are_rejected() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .get(format!(
            "{}/api/revenue-data?start=2023-01",
            server.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = client
        .get(format!(
            "{}/api/revenue-data?start=abc&end=2023-02",
            server.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}
