mod apply;
mod list;
mod status;

use axum::{routing::{get, post, put}, Router};

use crate::AppState;

pub use apply::apply_to_offer;
pub use list::{applications_for_offer, user_application, user_applications, ApplicationView};
pub use status::{update_application_status, ApplicationDecision};

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/offers/{id}/apply", post(apply::post_apply))
        .route("/offers/{id}/applications", get(list::get_offer_applications))
        .route("/offers/{id}/application", get(list::get_user_application))
        .route("/applications", get(list::get_user_applications))
        .route("/applications/{id}", put(status::put_status))
}
