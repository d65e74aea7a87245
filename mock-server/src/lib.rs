use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// One-pixel PNG, served for every menu image.
pub const PIXEL_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub first_name: String,
    pub last_name: String,
    pub card_full_name: String,
    pub card_number: String,
    pub card_expire_month: u8,
    pub card_expire_year: u16,
    #[serde(rename = "cardCVV")]
    pub card_cvv: String,
    pub uid: u32,
    pub last_oid: u32,
    pub order_status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserResponse {
    pub sid: String,
    pub uid: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub mid: u32,
    pub name: String,
    pub price: f64,
    pub location: Location,
    pub image_version: u32,
    pub short_description: String,
    pub delivery_time: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateUser {
    pub first_name: String,
    pub last_name: String,
    pub card_full_name: String,
    pub card_number: String,
    pub card_expire_month: u8,
    pub card_expire_year: u16,
    #[serde(rename = "cardCVV")]
    pub card_cvv: String,
    pub sid: String,
}

#[derive(Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
}

#[derive(Deserialize)]
pub struct SidQuery {
    pub sid: Option<String>,
}

#[derive(Deserialize)]
pub struct MenuQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub sid: Option<String>,
}

#[derive(Default)]
pub struct Store {
    next_uid: u32,
    users: HashMap<u32, User>,
    sessions: HashMap<String, u32>,
    menus: Vec<Menu>,
}

pub type Db = Arc<RwLock<Store>>;

type ApiResult<T> = Result<T, (StatusCode, Json<ResponseError>)>;

fn reject(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ResponseError>) {
    (
        status,
        Json(ResponseError {
            message: message.into(),
        }),
    )
}

pub fn seed_menus() -> Vec<Menu> {
    let menu = |mid: u32, name: &str, price: f64, lat: f64, lng: f64, delivery_time: u32| Menu {
        mid,
        name: name.to_string(),
        price,
        location: Location { lat, lng },
        image_version: 1,
        short_description: format!("{name} delivered hot"),
        delivery_time,
    };
    vec![
        menu(3, "Margherita", 8.5, 45.4781, 9.2272, 15),
        menu(11, "Ramen", 13.0, 45.4790, 9.2250, 25),
        menu(21, "Poke bowl", 11.9, 45.4770, 9.2280, 20),
    ]
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store {
        next_uid: 1,
        menus: seed_menus(),
        ..Store::default()
    }));
    Router::new()
        .route("/user", post(create_user))
        .route("/user/{uid}", get(get_user).put(update_user))
        .route("/menu", get(list_menus))
        .route("/menu/{mid}/image", get(get_menu_image))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Resolve a session token to its uid.
fn authorize(store: &Store, sid: Option<&str>) -> ApiResult<u32> {
    let sid = sid.ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "missing sid"))?;
    store
        .sessions
        .get(sid)
        .copied()
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "invalid sid"))
}

async fn create_user(State(db): State<Db>) -> Json<UserResponse> {
    let mut store = db.write().await;
    let uid = store.next_uid;
    store.next_uid += 1;
    let sid = Uuid::new_v4().simple().to_string();
    store.users.insert(
        uid,
        User {
            first_name: String::new(),
            last_name: String::new(),
            card_full_name: String::new(),
            card_number: String::new(),
            card_expire_month: 1,
            card_expire_year: 2030,
            card_cvv: String::new(),
            uid,
            last_oid: 0,
            order_status: "NONE".to_string(),
        },
    );
    store.sessions.insert(sid.clone(), uid);
    debug!(uid, "created user");
    Json(UserResponse { sid, uid })
}

async fn get_user(
    State(db): State<Db>,
    Path(uid): Path<u32>,
    Query(query): Query<SidQuery>,
) -> ApiResult<Json<User>> {
    let store = db.read().await;
    authorize(&store, query.sid.as_deref())?;
    store
        .users
        .get(&uid)
        .cloned()
        .map(Json)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, format!("user {uid} not found")))
}

async fn update_user(
    State(db): State<Db>,
    Path(uid): Path<u32>,
    Json(input): Json<UpdateUser>,
) -> ApiResult<Json<UserResponse>> {
    let mut store = db.write().await;
    let caller = authorize(&store, Some(input.sid.as_str()))?;
    if caller != uid {
        return Err(reject(StatusCode::FORBIDDEN, "sid does not own this user"));
    }
    if !(1..=12).contains(&input.card_expire_month) {
        return Err(reject(StatusCode::BAD_REQUEST, "invalid cardExpireMonth"));
    }
    let user = store
        .users
        .get_mut(&uid)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, format!("user {uid} not found")))?;
    user.first_name = input.first_name;
    user.last_name = input.last_name;
    user.card_full_name = input.card_full_name;
    user.card_number = input.card_number;
    user.card_expire_month = input.card_expire_month;
    user.card_expire_year = input.card_expire_year;
    user.card_cvv = input.card_cvv;
    Ok(Json(UserResponse {
        sid: input.sid,
        uid,
    }))
}

async fn list_menus(
    State(db): State<Db>,
    Query(query): Query<MenuQuery>,
) -> ApiResult<Json<Vec<Menu>>> {
    let store = db.read().await;
    authorize(&store, query.sid.as_deref())?;
    if query.lat.is_none() || query.lng.is_none() {
        return Err(reject(StatusCode::BAD_REQUEST, "lat and lng are required"));
    }
    Ok(Json(store.menus.clone()))
}

async fn get_menu_image(
    State(db): State<Db>,
    Path(mid): Path<u32>,
    Query(query): Query<SidQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = db.read().await;
    authorize(&store, query.sid.as_deref())?;
    let menu = store
        .menus
        .iter()
        .find(|m| m.mid == mid)
        .ok_or_else(|| reject(StatusCode::NOT_FOUND, format!("menu {mid} not found")))?;
    Ok(Json(serde_json::json!({
        "mid": menu.mid,
        "imageVersion": menu.image_version,
        "base64": PIXEL_PNG_BASE64,
    })))
}
