use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

struct TestServer {
    base_url: String,
    data_path: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_file(&self.data_path);
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[cfg(unix)]
mod cleanup {
    use std::sync::Mutex;
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PIDS: Mutex<Vec<i32>> = Mutex::new(Vec::new());

    pub fn register(pid: u32) {
        if let Ok(mut pids) = PIDS.lock() {
            pids.push(pid as i32);
        }
        REGISTER.call_once(|| unsafe {
            libc::atexit(on_exit);
        });
    }

    extern "C" fn on_exit() {
        if let Ok(pids) = PIDS.lock() {
            for &pid in pids.iter().filter(|pid| **pid > 0) {
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
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
    path.push(format!(
        "finance_tracker_http_{}_{}.json",
        std::process::id(),
        nanos
    ));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/dashboard")).send().await {
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
    let child = Command::new(env!("CARGO_BIN_EXE_finance_tracker"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", &data_path)
        .env("RUST_LOG", "info")
        .env_remove("FINANCE_REMOTE_URL")
        .env_remove("FINANCE_REMOTE_KEY")
        .env_remove("FINANCE_ADMIN_EMAIL")
        .env_remove("FINANCE_ADMIN_PASSWORD")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer {
        base_url,
        data_path,
        child,
    }
}

async fn dashboard(client: &Client, server: &TestServer) -> Value {
    client
        .get(format!("{}/api/dashboard", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn add(client: &Client, server: &TestServer, body: Value) -> reqwest::Response {
    client
        .post(format!("{}/api/transactions", server.base_url))
        .json(&body)
        .send()
        .await
        .unwrap()
}

fn balances(dashboard: &Value) -> Vec<Value> {
    dashboard["series"]
        .as_array()
        .unwrap()
        .iter()
        .map(|point| point["balance"].clone())
        .collect()
}

#[tokio::test]
async fn http_local_mode_add_updates_summary_series_and_table() {
    let _guard = TEST_LOCK.lock().await;
    let server = spawn_server().await;
    let client = Client::new();

    let empty = dashboard(&client, &server).await;
    assert_eq!(empty["mode"], "local");
    assert_eq!(empty["total"], json!(0));
    assert_eq!(empty["session"]["privileged"], json!(true));

    let response = add(
        &client,
        &server,
        json!({ "date": "2024-01-01", "description": "Salary", "amount": 5000 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let after_one = dashboard(&client, &server).await;
    assert_eq!(after_one["total"], json!(5000));
    assert_eq!(after_one["rows"].as_array().unwrap().len(), 1);
    assert_eq!(balances(&after_one), vec![json!(5000)]);

    let response = add(
        &client,
        &server,
        json!({ "date": "2024-01-05", "description": "Groceries", "amount": "-1200" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let after_two = dashboard(&client, &server).await;
    assert_eq!(after_two["total"], json!(3800));
    assert_eq!(balances(&after_two), vec![json!(5000), json!(3800)]);
    assert_eq!(after_two["rows"][0]["description"], "Groceries");
    assert_eq!(after_two["total_display"], "Rp3.800");
}

#[tokio::test]
async fn http_invalid_amount_is_rejected() {
    let _guard = TEST_LOCK.lock().await;
    let server = spawn_server().await;
    let client = Client::new();

    let response = add(
        &client,
        &server,
        json!({ "date": "2024-01-01", "description": "Oops", "amount": "lots" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(dashboard(&client, &server).await["rows"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn http_logout_makes_writes_forbidden_until_login() {
    let _guard = TEST_LOCK.lock().await;
    let server = spawn_server().await;
    let client = Client::new();

    let session: Value = client
        .post(format!("{}/api/auth/logout", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["privileged"], json!(false));

    let response = add(
        &client,
        &server,
        json!({ "date": "2024-01-01", "description": "Salary", "amount": 5000 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(dashboard(&client, &server).await["rows"]
        .as_array()
        .unwrap()
        .is_empty());

    let response = client
        .post(format!("{}/api/auth/login", server.base_url))
        .json(&json!({ "email": "me@example.com", "password": "secret1" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["privileged"], json!(true));
}

#[tokio::test]
async fn http_edit_and_delete_through_api() {
    let _guard = TEST_LOCK.lock().await;
    let server = spawn_server().await;
    let client = Client::new();

    let created: Value = add(
        &client,
        &server,
        json!({ "date": "2024-01-01", "description": "Salary", "amount": 5000 }),
    )
    .await
    .json()
    .await
    .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let response = client
        .put(format!("{}/api/transactions/{id}", server.base_url))
        .json(&json!({ "amount": "4500", "description": "Salary (net)" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(dashboard(&client, &server).await["total"], json!(4500));

    let response = client
        .delete(format!("{}/api/transactions/{id}", server.base_url))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "cancelled");
    assert_eq!(dashboard(&client, &server).await["rows"].as_array().unwrap().len(), 1);

    let response = client
        .delete(format!("{}/api/transactions/{id}?confirm=true", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert!(dashboard(&client, &server).await["rows"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn http_form_post_redirects_to_page_with_new_row() {
    let _guard = TEST_LOCK.lock().await;
    let server = spawn_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/transactions", server.base_url))
        .form(&[("date", "2024-02-01"), ("description", "Bonus"), ("amount", "250")])
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let page = response.text().await.unwrap();
    assert!(page.contains("Bonus"));
    assert!(page.contains("Rp250"));
}
