use resend_rs::{Resend, types::CreateEmailBaseOptions};

use crate::orders::OrderRecord;
use crate::pending_orders::PendingOrderRecord;

fn env_non_empty(name: &'static str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn resend_ready() -> bool {
    env_non_empty("RESEND_API_KEY").is_some()
        && env_non_empty("RESEND_FROM").is_some()
        && env_non_empty("SF_BASE_URL").is_some()
}

fn join_base_and_path(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let p = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    format!("{}{}", base, p)
}

pub fn confirm_link(pending_order_id: &str, token: &str) -> Option<String> {
    let base_url = env_non_empty("SF_BASE_URL")?;
    let url = join_base_and_path(
        &base_url,
        &format!("/pending-orders/{}/confirm", pending_order_id),
    );
    Some(format!("{}?token={}", url, token))
}

pub fn edit_link(pending_order_id: &str, token: &str) -> Option<String> {
    let base_url = env_non_empty("SF_BASE_URL")?;
    let url = join_base_and_path(
        &base_url,
        &format!("/pending-orders/{}/edit", pending_order_id),
    );
    Some(format!("{}?token={}", url, token))
}

async fn maybe_send(to: &str, subject: &str, html: String) {
    if !resend_ready() {
        tracing::warn!(
            "RESEND_API_KEY/RESEND_FROM/SF_BASE_URL not configured; email not sent"
        );
        return;
    }
    let Some(from) = env_non_empty("RESEND_FROM") else {
        return;
    };

    let resend = Resend::default();
    let email = CreateEmailBaseOptions::new(from, [to.to_string()], subject).with_html(&html);
    if let Err(e) = resend.emails.send(email).await {
        tracing::warn!("failed to send email `{}`: {}", subject, e);
    }
}

/// Reminder sent when the sweep creates a pending order, a few days ahead
/// of the scheduled delivery. Carries both the confirm and the edit link.
pub async fn send_order_ready(
    to: &str,
    pending_order: &PendingOrderRecord,
    confirm_token: &str,
    edit_token: &str,
) {
    let (Some(confirm_url), Some(edit_url)) = (
        confirm_link(&pending_order.id, confirm_token),
        edit_link(&pending_order.id, edit_token),
    ) else {
        tracing::warn!("SF_BASE_URL not configured; order-ready email not sent");
        return;
    };

    let subject = format!(
        "Your reorder is ready - confirm by {}",
        pending_order.scheduled_for.format("%B %d")
    );
    let html = format!(
        "<p>Your scheduled reorder for {date} is ready.</p>\
         <p>Total: £{total}</p>\
         <p><a href=\"{confirm_url}\">Confirm this order</a></p>\
         <p><a href=\"{edit_url}\">Change items or quantities</a></p>",
        date = pending_order.scheduled_for.format("%B %d"),
        total = pending_order.items_snapshot.total,
    );
    maybe_send(to, &subject, html).await;
}

pub async fn send_order_expired(to: &str, pending_order: &PendingOrderRecord) {
    let html = format!(
        "<p>Your scheduled order for {} was not confirmed in time and has expired.</p>\
         <p>Your schedule is still active; the next cycle will create a fresh order.</p>",
        pending_order.scheduled_for.format("%B %d"),
    );
    maybe_send(to, "Your scheduled order has expired", html).await;
}

pub async fn send_payment_failed(
    to: &str,
    pending_order: &PendingOrderRecord,
    error_message: &str,
    edit_token: &str,
) {
    let retry_html = edit_link(&pending_order.id, edit_token)
        .map(|url| format!("<p><a href=\"{url}\">Review your order and try again</a></p>"))
        .unwrap_or_default();
    let html = format!(
        "<p>We could not take payment for your scheduled order: {error_message}</p>{retry_html}",
    );
    maybe_send(to, "Payment failed for your scheduled order", html).await;
}

pub async fn send_order_confirmation(to: &str, order: &OrderRecord) {
    let html = format!(
        "<p>Thanks! Your order {number} is confirmed.</p>\
         <p>Total charged: £{total}</p>",
        number = order.order_number,
        total = order.total_amount,
    );
    maybe_send(to, &format!("Order {} confirmed", order.order_number), html).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_joins_base_and_path() {
        assert_eq!(
            join_base_and_path("https://shop.example.com/", "/pending-orders/po_1/confirm"),
            "https://shop.example.com/pending-orders/po_1/confirm"
        );
        assert_eq!(
            join_base_and_path("https://shop.example.com", "pending-orders/po_1/edit"),
            "https://shop.example.com/pending-orders/po_1/edit"
        );
    }
}
