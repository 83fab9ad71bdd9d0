//! QR artifact rendering.

use base64::Engine as _;
use qrcode::render::svg;
use qrcode::QrCode;

use hl_domain::error::{Error, Result};

/// Render `code` as an SVG QR image wrapped in a `data:` URL the dashboard
/// can drop straight into an `<img src>`.
pub fn render_data_url(code: &str) -> Result<String> {
    let qr = QrCode::new(code.as_bytes()).map_err(|e| Error::Other(format!("QR encode: {e}")))?;
    let image = qr
        .render()
        .min_dimensions(256, 256)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();
    let encoded = base64::engine::general_purpose::STANDARD.encode(image.as_bytes());
    Ok(format!("data:image/svg+xml;base64,{encoded}"))
}
