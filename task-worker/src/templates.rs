//! Customer emails, each rendered as an HTML body with a plain-text alternative.

use html_escape::encode_quoted_attribute as escape;
use shared::models::{Booking, Listing, Payment, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn layout(heading: &str, color: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{heading}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: {color};">{heading}</h2>
{body}
        <p style="color: #666; font-size: 12px; margin-top: 40px;">ALX Travel App</p>
    </div>
</body>
</html>
"#
    )
}

fn stay_rows(listing: &Listing, booking: &Booking) -> String {
    format!(
        r#"        <table style="border-collapse: collapse; margin: 20px 0;">
            <tr><td style="padding: 4px 12px 4px 0;"><strong>Property</strong></td><td>{title}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0;"><strong>Location</strong></td><td>{location}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0;"><strong>Check-in</strong></td><td>{start}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0;"><strong>Check-out</strong></td><td>{end}</td></tr>
        </table>"#,
        title = escape(&listing.title),
        location = escape(&listing.location),
        start = booking.start_date,
        end = booking.end_date,
    )
}

fn stay_lines(listing: &Listing, booking: &Booking) -> String {
    format!(
        "Property: {}\nLocation: {}\nCheck-in: {}\nCheck-out: {}\n",
        listing.title, listing.location, booking.start_date, booking.end_date
    )
}

pub fn booking_confirmation(user: &User, booking: &Booking, listing: &Listing) -> Email {
    let name = user.display_name();
    let body = format!(
        r#"        <p>Hi {name},</p>
        <p>Your booking has been received. Complete the payment to confirm your stay.</p>
{stay}
        <p style="color: #666; font-size: 14px;">Booking ID: {id}</p>"#,
        name = escape(&name),
        stay = stay_rows(listing, booking),
        id = booking.id,
    );
    let text = format!(
        "Hi {name},\n\nYour booking has been received. Complete the payment to confirm your stay.\n\n{stay}\nBooking ID: {id}\n",
        stay = stay_lines(listing, booking),
        id = booking.id,
    );

    Email {
        to: user.email.clone(),
        subject: format!("Booking Confirmation - {}", listing.title),
        html: layout("Booking Confirmation", "#2563eb", &body),
        text,
    }
}

pub fn payment_confirmation(user: &User, payment: &Payment, booking: &Booking, listing: &Listing) -> Email {
    let name = user.display_name();
    let body = format!(
        r#"        <p>Hi {name},</p>
        <p>We received your payment of <strong>{amount} {currency}</strong>. Your booking is confirmed.</p>
{stay}
        <p style="color: #666; font-size: 14px;">Payment reference: {reference}</p>"#,
        name = escape(&name),
        amount = payment.amount,
        currency = escape(&payment.currency),
        stay = stay_rows(listing, booking),
        reference = escape(&payment.reference),
    );
    let text = format!(
        "Hi {name},\n\nWe received your payment of {amount} {currency}. Your booking is confirmed.\n\n{stay}\nPayment reference: {reference}\n",
        amount = payment.amount,
        currency = payment.currency,
        stay = stay_lines(listing, booking),
        reference = payment.reference,
    );

    Email {
        to: user.email.clone(),
        subject: format!("Payment Confirmation - {}", listing.title),
        html: layout("Payment Confirmation", "#16a34a", &body),
        text,
    }
}

pub fn payment_failed(user: &User, payment: &Payment, booking: &Booking, listing: &Listing) -> Email {
    let name = user.display_name();
    let body = format!(
        r#"        <p>Hi {name},</p>
        <p>Your payment of <strong>{amount} {currency}</strong> could not be completed. Your booking is still waiting for payment; you can try again from your bookings page.</p>
{stay}
        <p style="color: #666; font-size: 14px;">Payment reference: {reference}</p>"#,
        name = escape(&name),
        amount = payment.amount,
        currency = escape(&payment.currency),
        stay = stay_rows(listing, booking),
        reference = escape(&payment.reference),
    );
    let text = format!(
        "Hi {name},\n\nYour payment of {amount} {currency} could not be completed. Your booking is still waiting for payment; you can try again from your bookings page.\n\n{stay}\nPayment reference: {reference}\n",
        amount = payment.amount,
        currency = payment.currency,
        stay = stay_lines(listing, booking),
        reference = payment.reference,
    );

    Email {
        to: user.email.clone(),
        subject: format!("Payment Failed - {}", listing.title),
        html: layout("Payment Failed", "#dc2626", &body),
        text,
    }
}
