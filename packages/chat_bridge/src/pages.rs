//! Fixed HTML pages served next to the WebSocket endpoint.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use maud::{DOCTYPE, Markup, html};

pub fn homepage() -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { "Chat Bridge" }
            }
            body {
                h1 { "Chat Bridge" }
                p {
                    "Chat Bridge runs here. Browser clients connect to this address "
                    "over WebSocket to read and send chat messages."
                }
            }
        }
    }
}

pub fn not_found() -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { "404 Not Found" }
            }
            body {
                h2 { "404 Not Found" }
                p { a href="/" { "Chat Bridge homepage" } }
            }
        }
    }
}

pub async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(not_found().into_string()))
}
