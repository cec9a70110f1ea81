use chrono::{DateTime, FixedOffset};

use crate::rates::{CoinQuote, RateSnapshot};

/// Fixed marker embedded in every rendered message. Inbound channel posts
/// carrying it are the bot's own sends/edits echoing back, not admin posts.
pub const SIGNATURE: &str = "📊 КУРС.";

const FALLBACK: &str = "n/a";

/// Render the rate board as Telegram HTML.
///
/// Pure function of the snapshot and the passed-in instant. The displayed
/// date/time is the render-time clock, not the snapshot capture time.
/// Missing figures render as a fallback string; this never fails.
pub fn render(snapshot: &RateSnapshot, now: DateTime<FixedOffset>) -> String {
    let mut text = format!(
        "<b>{SIGNATURE} BTC: {}</b> {}\n\n",
        usd_price(snapshot.bitcoin.as_ref()),
        trend(snapshot.bitcoin.as_ref()),
    );

    text.push_str(&format!(
        "🔹 <b>ETH:</b> <code>{}</code> {}\n",
        usd_price(snapshot.ethereum.as_ref()),
        trend(snapshot.ethereum.as_ref()),
    ));
    text.push_str(&format!(
        "🔹 <b>USDT:</b> <code>{}</code> {}\n\n",
        flat_price(snapshot.tether.as_ref()),
        trend(snapshot.tether.as_ref()),
    ));

    text.push_str("⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯\n\n");

    text.push_str(&format!(
        "💵 <b>Грн до $:</b> <code>{}</code> 📉\n",
        fiat(snapshot.usd_uah, 2)
    ));
    text.push_str(&format!(
        "💵 <b>Руб до $:</b> <code>{}</code> 📈\n",
        fiat(snapshot.usd_rub, 2)
    ));
    text.push_str(&format!(
        "🇰🇿 <b>Тнг до $:</b> <code>{}</code> 📈\n",
        fiat(snapshot.usd_kzt, 2)
    ));
    text.push_str(&format!(
        "💶 <b>$ до €:</b>  <code>{}</code> 📉\n\n",
        fiat(snapshot.usd_eur, 3)
    ));

    text.push_str(&format!(
        "🗓 <b>Дата:</b> <code>{}</code>\n",
        now.format("%d.%m.%Y")
    ));
    text.push_str(&format!(
        "🔄 <b>Обновлено:</b> <code>{}</code>\n",
        now.format("%H:%M")
    ));

    text
}

fn usd_price(quote: Option<&CoinQuote>) -> String {
    match quote {
        Some(q) => format!("${}", group_thousands(q.price)),
        None => FALLBACK.to_string(),
    }
}

// USDT hovers around 1.0; thousands grouping would be noise
fn flat_price(quote: Option<&CoinQuote>) -> String {
    match quote {
        Some(q) => format!("${:.2}", q.price),
        None => FALLBACK.to_string(),
    }
}

fn trend(quote: Option<&CoinQuote>) -> &'static str {
    match quote.and_then(|q| q.change_24h) {
        Some(change) if change < 0.0 => "📉",
        Some(_) => "📈",
        None => "➖",
    }
}

fn fiat(rate: Option<f64>, decimals: usize) -> String {
    match rate {
        Some(r) => format!("{r:.decimals$}"),
        None => FALLBACK.to_string(),
    }
}

/// "65432.1" -> "65,432.10"
fn group_thousands(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let (int_part, frac_part) = formatted
        .split_once('.')
        .unwrap_or((formatted.as_str(), "00"));
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped}.{frac_part}")
}
