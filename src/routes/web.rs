use axum::response::{Html, Redirect};

pub async fn root() -> Redirect {
    Redirect::to("/web")
}

pub async fn form() -> Html<&'static str> {
    Html(include_str!("../../static/web.html"))
}
