//! What the action button on an offer card shows for the current viewer.

use crate::db::{ApplicationStatus, OfferStatus};

#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonInput {
    /// Parent context says the viewer applied (the "applied offers" lists).
    pub is_applied: bool,
    pub status: Option<OfferStatus>,
    pub application_status: Option<ApplicationStatus>,
    /// The viewer's own application row, looked up independently.
    pub user_application: Option<ApplicationStatus>,
    /// Transaction for the offer is already claimed.
    pub claimed: bool,
    /// The viewer posted the offer and manages it instead.
    pub is_owner: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyButton {
    Apply,
    NotAvailable,
    Badge(ApplicationStatus),
    Claim { claimed: bool },
}

impl ApplyButton {
    /// `None` for the owner, who gets the management controls instead.
    pub fn resolve(input: ButtonInput) -> Option<ApplyButton> {
        if input.is_owner && !input.is_applied {
            return None;
        }
        Some(Self::resolve_for_viewer(input))
    }

    fn resolve_for_viewer(input: ButtonInput) -> ApplyButton {
        let completed = input.status == Some(OfferStatus::Completed);
        let accepted = input.application_status == Some(ApplicationStatus::Accepted)
            || input.user_application == Some(ApplicationStatus::Accepted);

        if input.is_applied && completed && accepted {
            return ApplyButton::Claim { claimed: input.claimed };
        }

        if input.is_applied {
            return ApplyButton::Badge(input.application_status.unwrap_or(ApplicationStatus::Pending));
        }

        if let Some(status) = input.user_application {
            return ApplyButton::Badge(status);
        }

        if input.status == Some(OfferStatus::Available) {
            ApplyButton::Apply
        } else {
            ApplyButton::NotAvailable
        }
    }

    pub fn label(&self) -> &'static str {
        use ApplicationStatus::*;
        match self {
            ApplyButton::Apply => "Apply",
            ApplyButton::NotAvailable => "Not Available",
            ApplyButton::Badge(Pending) => "Application Pending",
            ApplyButton::Badge(Accepted) => "Application Accepted",
            ApplyButton::Badge(Rejected) => "Application Rejected",
            ApplyButton::Claim { claimed: false } => "Claim Credits",
            ApplyButton::Claim { claimed: true } => "Credits Claimed",
        }
    }

    pub fn enabled(&self) -> bool {
        matches!(self, ApplyButton::Apply | ApplyButton::Claim { claimed: false })
    }

    pub fn class(&self) -> &'static str {
        match self {
            ApplyButton::Apply => "btn apply",
            ApplyButton::NotAvailable => "btn disabled",
            ApplyButton::Badge(status) => status_class(*status),
            ApplyButton::Claim { claimed: false } => "btn claim",
            ApplyButton::Claim { claimed: true } => "btn gray",
        }
    }

    /// Client action the button triggers, if any.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            ApplyButton::Apply => Some("apply"),
            ApplyButton::Claim { claimed: false } => Some("claim"),
            _ => None,
        }
    }
}

pub fn status_class(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::Pending => "badge yellow",
        ApplicationStatus::Accepted => "badge green",
        ApplicationStatus::Rejected => "badge red",
    }
}
