use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackerView {
    inputs: Value,
    calculated: Value,
    last_saved: Option<String>,
    history_len: usize,
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

fn unique_data_path() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("goal_tracker_http_{}_{}.json", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/goals")).send().await {
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
    let data_path = unique_data_path();
    let child = Command::new(env!("CARGO_BIN_EXE_goal_tracker"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", data_path)
        .env_remove("CRM_API_URL")
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

async fn clear_history(client: &Client, base_url: &str) {
    let response = client
        .delete(format!("{base_url}/api/goals/history?confirm=true"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

async fn put_inputs(client: &Client, base_url: &str, inputs: Value) -> reqwest::Response {
    client
        .put(format!("{base_url}/api/goals/inputs"))
        .json(&inputs)
        .send()
        .await
        .unwrap()
}

fn example_inputs() -> Value {
    json!({
        "avgLoanAmount": 200000.0,
        "annualClosingsDollarGoal": 40000000.0,
        "pullThroughRate": 0.9,
        "conversionToApp": 0.5,
        "totalReferralPartners": 4,
        "annualIncomeGoal": 200000.0,
        "avgCommissionBasisPoints": 0.01,
        "preQualToAppRate": 0.5
    })
}

#[tokio::test]
async fn http_update_inputs_recomputes_plans() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = put_inputs(&client, &server.base_url, example_inputs()).await;
    assert!(response.status().is_success());
    let view: TrackerView = response.json().await.unwrap();

    let simplified = &view.calculated["simplified"];
    assert_eq!(simplified["annualClosingsUnitGoal"], json!(200.0));
    assert_eq!(simplified["annualOriginationUnitGoal"], json!(222.0));
    assert_eq!(view.inputs["pullThroughRate"], json!(0.9));
    assert!(view.last_saved.is_some());

    let fetched: TrackerView = client
        .get(format!("{}/api/goals", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.calculated, view.calculated);
}

#[tokio::test]
async fn http_rejects_invalid_inputs() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let mut inputs = example_inputs();
    inputs["pullThroughRate"] = json!(1.5);
    let response = put_inputs(&client, &server.base_url, inputs).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().contains("pullThroughRate"));
}

#[tokio::test]
async fn http_snapshot_save_and_load_round_trip() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    clear_history(&client, &server.base_url).await;

    put_inputs(&client, &server.base_url, example_inputs()).await;
    let history: Vec<Value> = client
        .post(format!("{}/api/goals/history", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let mut other = example_inputs();
    other["avgLoanAmount"] = json!(350000.0);
    put_inputs(&client, &server.base_url, other).await;

    let loaded: TrackerView = client
        .post(format!("{}/api/goals/history/0/load", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(loaded.inputs, history[0]["inputs"]);
    assert_eq!(loaded.calculated, history[0]["calculated"]);
    assert_eq!(loaded.history_len, 1);

    let missing = client
        .post(format!("{}/api/goals/history/7/load", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_clear_history_requires_confirmation() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    client
        .post(format!("{}/api/goals/history", server.base_url))
        .send()
        .await
        .unwrap();

    let refused = client
        .delete(format!("{}/api/goals/history", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(refused.status(), StatusCode::CONFLICT);

    clear_history(&client, &server.base_url).await;
    let history: Vec<Value> = client
        .get(format!("{}/api/goals/history", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn http_export_csv_is_attachment() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    put_inputs(&client, &server.base_url, example_inputs()).await;

    let response = client
        .get(format!("{}/api/goals/export.csv", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"goal-tracker-"));

    let body = response.text().await.unwrap();
    assert!(body.starts_with("Field,Value"));
    assert!(body.contains("Simplified Annual Origination Unit Goal,222"));
}

#[tokio::test]
async fn http_error_report_without_backend_is_unavailable() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/error-report", server.base_url))
        .json(&json!({
            "error_message": "boom",
            "stack": "at render",
            "url": "http://localhost/goals"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
