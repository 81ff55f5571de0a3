// apiserver.rs

use askama::Template;
use axum::{
    body::Body,
    extract::{rejection::FormRejection, Form, Query, State},
    http::{header, Method, Response, StatusCode, Uri},
    response::{Html, IntoResponse},
    routing::*,
    Json, Router,
};
pub use axum_macros::debug_handler;

use crate::*;

#[derive(Template)]
#[template(path = "index.html.ask", escape = "html")]
pub struct IndexPage {
    pub myid: String,
    pub event_type: String,
    pub value: String,
    pub last_published: String,
    pub event_adjustment: f32,
    pub event_publish_interval: u64,
    pub fw_version: &'static str,
    pub build_time: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentForm {
    pub event_adjustment: Option<String>,
    pub event_publish_interval: Option<String>,
}

pub async fn run_api_server(state: Arc<Pin<Box<MyState>>>) -> anyhow::Result<()> {
    loop {
        if *state.wifi_up.read().await {
            break;
        }
        sleep(Duration::from_secs(1)).await;
    }

    let listen = format!("0.0.0.0:{}", state.config.read().await.port);
    let addr = listen.parse::<net::SocketAddr>()?;

    let app = api_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening to {listen}");
    Ok(axum::serve(listener, app.into_make_service()).await?)
}

pub fn api_router(state: Arc<Pin<Box<MyState>>>) -> Router {
    Router::new()
        .route("/", get(get_index).post(post_index))
        .route("/temp", get(get_temp))
        .route(
            "/config",
            get(get_config).post(post_config).options(options),
        )
        .route("/reset", get(reset_config))
        .fallback(not_found)
        .with_state(state)
}

pub async fn options(State(state): State<Arc<Pin<Box<MyState>>>>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} options()");

    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "get,post"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "content-type"),
        ],
    )
        .into_response()
}

pub async fn get_index(State(state): State<Arc<Pin<Box<MyState>>>>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_index()");

    Box::pin(render_index(&state)).await
}

#[debug_handler]
pub async fn post_index(
    State(state): State<Arc<Pin<Box<MyState>>>>,
    form: Result<Form<AdjustmentForm>, FormRejection>,
) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} post_index()");

    let form = match form {
        Ok(Form(f)) => f,
        Err(e) => {
            error!("Bad form: {e}");
            return invalid_request();
        }
    };

    let Some(adjustment) = parse_field::<f32>(form.event_adjustment.as_deref()) else {
        return invalid_request();
    };

    let mut config = state.config.read().await.clone();
    config.event_adjustment = adjustment;
    match form.event_publish_interval.as_deref().map(str::trim) {
        None | Some("") => {}
        Some(s) => match s.parse::<u64>() {
            Ok(ms) => config.event_publish_interval = ms,
            Err(_) => return invalid_request(),
        },
    }

    if let Err(e) = config.validate() {
        error!("Rejected form input: {e}");
        return (StatusCode::BAD_REQUEST, format!("400: {e}")).into_response();
    }

    {
        let mut store = state.store.lock().await;
        if let Err(e) = config.to_store(&mut **store) {
            let msg = format!("Nvs write error: {e:?}");
            error!("{msg}");
            return (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response();
        }
    }
    info!(
        "New adjustment {adjustment}, publish interval {} ms",
        config.event_publish_interval
    );
    // picked up by the sensor loop at its next tick
    *state.config.write().await = config;

    Box::pin(render_index(&state)).await
}

pub async fn get_temp(
    State(state): State<Arc<Pin<Box<MyState>>>>,
) -> (StatusCode, Json<TempReading>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_temp()");

    let mut ret = state.reading.read().await.clone();
    ret.uptime = *state.uptime.read().await;
    (StatusCode::OK, Json(ret))
}

pub async fn get_config(
    State(state): State<Arc<Pin<Box<MyState>>>>,
) -> (StatusCode, Json<MyConfig>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_conf()");
    (StatusCode::OK, Json(state.config.read().await.clone()))
}

pub async fn post_config(
    State(state): State<Arc<Pin<Box<MyState>>>>,
    Json(config): Json<MyConfig>,
) -> (StatusCode, String) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} set_conf()");

    if let Err(e) = config.validate() {
        let msg = format!("Config error: {e}");
        error!("{msg}");
        return (StatusCode::BAD_REQUEST, msg);
    }

    info!("Saving new config to nvs...");
    Box::pin(save_conf(state, config)).await
}

pub async fn reset_config(State(state): State<Arc<Pin<Box<MyState>>>>) -> (StatusCode, String) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} reset_conf()");

    info!("Saving default config to nvs...");
    Box::pin(save_conf(state, MyConfig::default())).await
}

pub async fn not_found(
    method: Method,
    uri: Uri,
    Query(mut args): Query<Vec<(String, String)>>,
    body: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> (StatusCode, String) {
    // GET and HEAD forms come from the query string, already counted
    if method != Method::GET && method != Method::HEAD {
        if let Ok(Form(fields)) = body {
            args.extend(fields);
        }
    }

    let mut message = format!(
        "File Not Found\n\nURI: {}\nMethod: {}\nArguments: {}\n",
        uri.path(),
        method,
        args.len()
    );
    for (name, value) in args {
        message.push_str(&format!(" {name}: {value}\n"));
    }
    (StatusCode::NOT_FOUND, message)
}

async fn save_conf(state: Arc<Pin<Box<MyState>>>, config: MyConfig) -> (StatusCode, String) {
    let mut store = state.store.lock().await;
    match config.to_store(&mut **store) {
        Ok(_) => {
            info!("Config saved to nvs. Resetting soon...");
            *state.reset.write().await = true;
            (StatusCode::OK, "OK".to_string())
        }
        Err(e) => {
            let msg = format!("Nvs write error: {e:?}");
            error!("{msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, msg)
        }
    }
}

async fn render_index(state: &MyState) -> Response<Body> {
    let page = {
        let config = state.config.read().await;
        let reading = state.reading.read().await;
        IndexPage {
            myid: state.myid.read().await.clone(),
            event_type: config.event_type.clone(),
            value: fmt_temp(reading.value),
            last_published: fmt_temp(reading.last_published),
            event_adjustment: config.event_adjustment,
            event_publish_interval: config.event_publish_interval,
            fw_version: FW_VERSION,
            build_time: BUILD_TIMESTAMP.unwrap_or("-"),
        }
    };

    match page.render() {
        Err(e) => {
            let err_msg = format!("Index template error: {e:?}\n");
            error!("{err_msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, err_msg).into_response()
        }
        Ok(s) => (StatusCode::OK, Html(s)).into_response(),
    }
}

fn invalid_request() -> Response<Body> {
    (StatusCode::BAD_REQUEST, "400: Invalid Request").into_response()
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>) -> Option<T> {
    match field.map(str::trim) {
        None | Some("") => None,
        Some(s) => s.parse().ok(),
    }
}

fn fmt_temp(v: f32) -> String {
    if v.is_nan() {
        "-".to_string()
    } else {
        format!("{v:.2}")
    }
}


// EOF
