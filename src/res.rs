use axum::{
    debug_handler,
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::AppResult;

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

#[debug_handler]
pub async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/javascript")], include_res!(str, "/app.js"))
}

#[debug_handler]
pub async fn style_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], include_res!(str, "/style.css"))
}

/// Page shown when something doesn't exist or isn't yours.
pub fn sorry(what: &str) -> AppResult<Response> {
    Ok(Html(
        include_res!(str, "/pages/sorry.html").replace("{what}", &escape(what))
    ).into_response())
}

pub fn to_login(return_url: &str) -> Response {
    Redirect::to(&format!("/login?return_url={return_url}")).into_response()
}

/// Minimal HTML escaping for user supplied text placed into templates.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
