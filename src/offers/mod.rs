mod card;
mod complete;
mod edit;
mod list;
mod new;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use card::Card;
pub use complete::complete_offer;
pub use edit::{delete_offer, update_offer};
pub use list::{get_offer, list_offers, user_offers, OfferListing};
pub use new::{create_offer, NewOffer, OfferInput, MAX_TIME_CREDITS, SERVICE_CATEGORIES};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/offers", get(list::explore_page))
        .route("/offer", get(new::new_offer_page))
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/offers", get(list::get_offers).post(new::post_offer))
        .route(
            "/offers/{id}",
            get(list::get_one).put(edit::put_offer).delete(edit::delete_offer_handler),
        )
        .route("/offers/{id}/complete", post(complete::post_complete))
        .route("/offers/{id}/claim", post(crate::claims::post_claim))
        .route("/me/offers", get(list::get_user_offers))
}
