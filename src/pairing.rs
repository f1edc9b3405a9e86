//! Pairing challenge rendering
//!
//! Turns the opaque challenge string from the transport into a QR image the
//! dashboard can embed directly (SVG wrapped in a base64 data URL).

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use qrcode::render::svg;
use qrcode::QrCode;

/// Render a pairing challenge as an embeddable `data:image/svg+xml` URL
pub fn render_challenge(challenge: &str) -> Result<String> {
    let code = QrCode::new(challenge.as_bytes()).map_err(|e| Error::Pairing(e.to_string()))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(240, 240)
        .quiet_zone(true)
        .build();

    Ok(format!(
        "data:image/svg+xml;base64,{}",
        BASE64_STANDARD.encode(image.as_bytes())
    ))
}
