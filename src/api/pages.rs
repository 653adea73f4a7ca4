//! Server-rendered HTML for the download pages.

use crate::session::Session;

/// Generate the HTML shell for a page.
fn html_shell(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex, nofollow">
    <title>{title} - Photomaton</title>
    <style>
        body {{ margin: 0; font-family: system-ui, sans-serif; background: #111; color: #eee; }}
        main {{ max-width: 960px; margin: 0 auto; padding: 24px 16px; }}
        h1 {{ font-size: 1.5rem; }}
        .grid {{ display: grid; gap: 16px; grid-template-columns: repeat(auto-fit, minmax(240px, 1fr)); }}
        figure {{ margin: 0; background: #1c1c1c; border-radius: 12px; overflow: hidden; }}
        figure img {{ display: block; width: 100%; height: auto; }}
        figcaption {{ padding: 8px 12px; }}
        a {{ color: #7cc4ff; }}
        .muted {{ color: #999; font-size: 0.875rem; }}
    </style>
</head>
<body>
    <main>
        {content}
    </main>
</body>
</html>"#
    )
}

/// Gallery of a session's photos with download links.
pub fn gallery(session: &Session) -> String {
    let id = session.id();
    let figures: String = session
        .images()
        .iter()
        .enumerate()
        .map(|(index, img)| {
            format!(
                r#"<figure>
            <img src="/s/{id}/{index}" alt="Foto {n}" width="{w}" height="{h}" loading="lazy">
            <figcaption><a href="/s/{id}/{index}?download=true" download>Descargar foto {n}</a></figcaption>
        </figure>"#,
                n = index + 1,
                w = img.width(),
                h = img.height(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n        ");

    let content = format!(
        r#"<h1>Tus fotos</h1>
        <p class="muted">Disponibles hasta {expires} (UTC).</p>
        <div class="grid">
        {figures}
        </div>"#,
        expires = session.expires_at().format("%Y-%m-%d %H:%M"),
    );
    html_shell("Tus fotos", &content)
}

/// Shown for unknown and expired sessions alike.
pub fn not_found() -> String {
    html_shell(
        "No disponible",
        r#"<h1>Enlace no disponible</h1>
        <p class="muted">Este enlace no existe o ha caducado.</p>"#,
    )
}
