use crate::{
    applications::ApplicationView,
    button::{status_class, ApplyButton},
    db::{ApplicationStatus, Offer, OfferStatus},
    include_res,
    res::escape,
    Markdown,
};

/// One offer as shown in the lists. The owner gets the management controls,
/// everyone else gets the apply/claim button.
pub struct Card<'a> {
    pub offer: &'a Offer,
    pub owner_name: Option<&'a str>,
    pub button: Option<ApplyButton>,
    /// Applications to manage, only set on the owner's own offers.
    pub applications: Option<&'a [ApplicationView]>,
    /// Extra line under the description, e.g. who completed it.
    pub note: Option<&'a str>,
}

impl<'a> Card<'a> {
    pub fn default_for(offer: &'a Offer) -> Self {
        Self { offer, owner_name: None, button: None, applications: None, note: None }
    }

    pub fn render(&self) -> String {
        let offer = self.offer;
        let id = offer.id.to_string();

        let mut actions = String::new();
        if let Some(button) = self.button {
            actions += &render_button(&id, button);
        }
        if let Some(applications) = self.applications {
            actions += &self.owner_controls(&id, applications);
        }

        include_res!(str, "/pages/offer_card.html")
            .replace("{id}", &id)
            .replace("{title}", &escape(&offer.title))
            .replace("{service_type}", &escape(&offer.service_type))
            .replace("{status}", offer.status.as_str())
            .replace("{status_class}", offer_status_class(offer.status))
            .replace("{duration}", &format_hours(offer.duration))
            .replace("{credits}", &offer.time_credits.to_string())
            .replace("{date}", &escape(offer.date.as_deref().unwrap_or("Flexible")))
            .replace("{owner}", &escape(self.owner_name.unwrap_or("Unknown")))
            .replace("{note}", &self.note.map(|n| format!("<p class=\"note\">{}</p>", escape(n))).unwrap_or_default())
            .replace("{actions}", &actions)
            // last, so markdown can't smuggle in placeholders
            .replace("{description}", &Markdown(&offer.description).to_html())
    }

    fn owner_controls(&self, id: &str, applications: &[ApplicationView]) -> String {
        let mut html = String::new();

        if !applications.is_empty() {
            html += "<ul class=\"applications\">";
            for view in applications {
                let app = &view.application;
                html += &format!(
                    "<li><span>{name}</span> <span class=\"{class}\">{status}</span>",
                    name = escape(view.username.as_deref().unwrap_or("Unknown")),
                    class = status_class(app.status),
                    status = app.status,
                );
                if app.status == ApplicationStatus::Pending && self.offer.status == OfferStatus::Available {
                    html += &format!(
                        "<button class=\"btn green\" data-action=\"decide\" data-application=\"{0}\" data-status=\"accepted\">Accept</button>\
                         <button class=\"btn red\" data-action=\"decide\" data-application=\"{0}\" data-status=\"rejected\">Reject</button>",
                        app.id,
                    );
                }
                html += "</li>";
            }
            html += "</ul>";
        }

        if self.offer.status.is_in_progress() {
            html += &format!("<button class=\"btn\" data-action=\"complete\" data-offer=\"{id}\">Mark as Completed</button>");
        }
        if self.offer.status != OfferStatus::Completed {
            html += &format!("<button class=\"btn red\" data-action=\"delete\" data-offer=\"{id}\">Delete</button>");
        }
        html
    }
}

fn render_button(id: &str, button: ApplyButton) -> String {
    match button.action() {
        Some(action) => format!(
            "<button class=\"{}\" data-action=\"{action}\" data-offer=\"{id}\">{}</button>",
            button.class(),
            button.label(),
        ),
        None if button.enabled() => format!("<button class=\"{}\">{}</button>", button.class(), button.label()),
        None => format!("<span class=\"{}\">{}</span>", button.class(), button.label()),
    }
}

pub(crate) fn offer_status_class(status: OfferStatus) -> &'static str {
    use OfferStatus::*;
    match status {
        Available => "badge green",
        Pending | Accepted | Booked => "badge yellow",
        Completed => "badge blue",
        Cancelled => "badge gray",
    }
}

fn format_hours(hours: f64) -> String {
    if hours == 1.0 {
        "1 hour".to_owned()
    } else {
        format!("{hours} hours")
    }
}
