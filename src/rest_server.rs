use crate::display::SharedDisplay;
use crate::homie::{DeviceInfo, SharedDevices};
use crate::models::{Direction, UserAction};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::serde::{json::Json, Deserialize, Serialize};
use rocket::{get, post, routes, Build, Rocket, State};
use std::collections::BTreeMap;
use std::sync::PoisonError;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

/// What the REST handlers share with the dashboard task.
pub struct DashboardHandle {
    pub display: SharedDisplay,
    pub devices: SharedDevices,
    pub actions: UnboundedSender<UserAction>,
}

/// API Request payload
#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
struct ApiRequest {
    action: String,
    data: Option<String>,
}

/// API Response
#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
struct ApiResponse {
    status: String,
    message: String,
}

impl ApiResponse {
    fn success(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
            message: message.into(),
        })
    }

    fn error(message: impl Into<String>) -> (Status, Json<Self>) {
        (
            Status::BadRequest,
            Json(Self {
                status: "error".to_string(),
                message: message.into(),
            }),
        )
    }
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
struct StateResponse {
    state: String,
    messages: String,
}

/// CORS Fairing for Rocket
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _req: &'r rocket::Request<'_>, res: &mut rocket::Response<'r>) {
        res.set_header(rocket::http::Header::new("Access-Control-Allow-Origin", "*"));
        res.set_header(rocket::http::Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST",
        ));
        res.set_header(rocket::http::Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type",
        ));
    }
}

/// Status line and message log
#[get("/")]
fn state_handler(handle: &State<DashboardHandle>) -> Json<StateResponse> {
    let surface = handle.display.snapshot();
    Json(StateResponse {
        state: surface.state,
        messages: surface.messages,
    })
}

#[get("/messages")]
fn messages_handler(handle: &State<DashboardHandle>) -> String {
    handle.display.snapshot().messages
}

#[get("/devices")]
fn devices_handler(handle: &State<DashboardHandle>) -> Json<BTreeMap<String, DeviceInfo>> {
    let devices = handle.devices.lock().unwrap_or_else(PoisonError::into_inner);
    Json(devices.snapshot())
}

#[get("/devices/<device>")]
fn device_handler(device: &str, handle: &State<DashboardHandle>) -> Option<Json<DeviceInfo>> {
    let devices = handle.devices.lock().unwrap_or_else(PoisonError::into_inner);
    devices.get(device).cloned().map(Json)
}

fn parse_action(request: &ApiRequest) -> Result<UserAction, String> {
    let data = request.data.as_deref().unwrap_or_default();
    match request.action.as_str() {
        "monitors" => data.parse::<Direction>().map(UserAction::SetMonitors),
        "seat" => data.parse::<Direction>().map(UserAction::SetSeat),
        "led" => match data {
            "true" => Ok(UserAction::ToggleLed(true)),
            "false" => Ok(UserAction::ToggleLed(false)),
            other => Err(format!("LED state must be \"true\" or \"false\", got '{}'", other)),
        },
        _ => Err("Unknown action".to_string()),
    }
}

/// Action handler
#[post("/action", data = "<payload>")]
fn action_handler(
    payload: Json<ApiRequest>,
    handle: &State<DashboardHandle>,
) -> Result<Json<ApiResponse>, (Status, Json<ApiResponse>)> {
    if payload.action == "ping" {
        return Ok(ApiResponse::success("pong"));
    }

    let action = parse_action(&payload).map_err(ApiResponse::error)?;
    if handle.actions.send(action).is_err() {
        error!("Dashboard is not running, dropping {:?}", action);
        return Err((
            Status::ServiceUnavailable,
            Json(ApiResponse {
                status: "error".to_string(),
                message: "Dashboard is not running".to_string(),
            }),
        ));
    }
    Ok(ApiResponse::success(format!("{:?} queued", action)))
}

pub fn build_rocket(handle: DashboardHandle) -> Rocket<Build> {
    rocket::build()
        .manage(handle)
        .mount(
            "/",
            routes![
                state_handler,
                messages_handler,
                devices_handler,
                device_handler,
                action_handler
            ],
        )
        .attach(Cors)
}

/// Run the Rocket server until it is shut down.
pub async fn run_rest_server(handle: DashboardHandle) {
    match build_rocket(handle).launch().await {
        Ok(_) => info!("REST server stopped."),
        Err(e) => error!("REST server failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::StatusView;
    use crate::homie::DeviceDirectory;
    use crate::models::Message;
    use rocket::http::ContentType;
    use rocket::local::asynchronous::Client;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    async fn client() -> (Client, SharedDisplay, SharedDevices, UnboundedReceiver<UserAction>) {
        let display = SharedDisplay::new();
        let devices = DeviceDirectory::shared();
        let (actions, actions_rx) = mpsc::unbounded_channel();
        let handle = DashboardHandle {
            display: display.clone(),
            devices: devices.clone(),
            actions,
        };
        let client = Client::tracked(build_rocket(handle)).await.unwrap();
        (client, display, devices, actions_rx)
    }

    async fn post_action(client: &Client, body: &str) -> (Status, serde_json::Value) {
        let response = client
            .post("/action")
            .header(ContentType::JSON)
            .body(body)
            .dispatch()
            .await;
        let status = response.status();
        let body = response.into_string().await.unwrap();
        (status, serde_json::from_str(&body).unwrap())
    }

    #[tokio::test]
    async fn should_expose_state_and_messages() {
        let (client, display, _, _) = client().await;
        let mut writer = display.clone();
        writer.set_state("Connected to broker:9001");
        writer.append_message(&Message::new("homie/chair1/led/on", "true"));

        let response = client.get("/").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["state"], "Connected to broker:9001");
        assert_eq!(body["messages"], "homie/chair1/led/on: true\n");

        let response = client.get("/messages").dispatch().await;
        assert_eq!(
            response.into_string().await.unwrap(),
            "homie/chair1/led/on: true\n"
        );
    }

    #[tokio::test]
    async fn should_list_discovered_devices() {
        let (client, _, devices, _) = client().await;
        crate::homie::record_shared(&devices, &Message::new("homie/chair1/$localip", "10.0.0.7"));

        let response = client.get("/devices").dispatch().await;
        let body: serde_json::Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["chair1"]["local_ip"], "10.0.0.7");

        let response = client.get("/devices/chair1").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let response = client.get("/devices/chair9").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[tokio::test]
    async fn should_queue_user_actions() {
        let (client, _, _, mut actions) = client().await;

        let (status, _) = post_action(&client, r#"{"action": "led", "data": "true"}"#).await;
        assert_eq!(status, Status::Ok);
        let (status, _) = post_action(&client, r#"{"action": "monitors", "data": "up"}"#).await;
        assert_eq!(status, Status::Ok);
        let (status, _) = post_action(&client, r#"{"action": "seat", "data": "stop"}"#).await;
        assert_eq!(status, Status::Ok);

        assert_eq!(actions.recv().await, Some(UserAction::ToggleLed(true)));
        assert_eq!(actions.recv().await, Some(UserAction::SetMonitors(Direction::Up)));
        assert_eq!(actions.recv().await, Some(UserAction::SetSeat(Direction::Stop)));
    }

    #[tokio::test]
    async fn should_answer_ping() {
        let (client, _, _, _) = client().await;
        let (status, body) = post_action(&client, r#"{"action": "ping"}"#).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["message"], "pong");
    }

    #[tokio::test]
    async fn should_reject_unknown_action_and_bad_data() {
        let (client, _, _, mut actions) = client().await;

        let (status, body) = post_action(&client, r#"{"action": "dance"}"#).await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Unknown action");

        let (status, _) = post_action(&client, r#"{"action": "seat", "data": "sideways"}"#).await;
        assert_eq!(status, Status::BadRequest);
        let (status, _) = post_action(&client, r#"{"action": "led", "data": "on"}"#).await;
        assert_eq!(status, Status::BadRequest);

        assert!(actions.try_recv().is_err());
    }
}
