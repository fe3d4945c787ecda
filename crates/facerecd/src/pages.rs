//! Minimal HTML pages.

use axum::response::Html;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, flashes: &[String], body: &str) -> Html<String> {
    let flashes: String = flashes
        .iter()
        .map(|m| format!("<p class=\"flash\">{}</p>\n", escape(m)))
        .collect();
    Html(format!(
        "<!doctype html>
<html>
<head><meta charset=\"utf-8\"><title>{title} - Face Recognition</title></head>
<body>
<nav><a href=\"/\">Home</a> | <a href=\"/upload\">Upload</a> | <a href=\"/realtime\">Realtime</a> | <a href=\"/register\">Register</a></nav>
{flashes}{body}
</body>
</html>
"
    ))
}

fn form_error(error: Option<&str>) -> String {
    error
        .map(|e| format!("<p class=\"error\">{}</p>\n", escape(e)))
        .unwrap_or_default()
}

/// Webcam capture posting a JPEG frame as the `webcam` field.
const WEBCAM_SCRIPT: &str = r#"<video id="cam" width="320" height="240" autoplay></video>
<canvas id="snap" width="320" height="240" hidden></canvas>
<script>
const cam = document.getElementById('cam');
navigator.mediaDevices.getUserMedia({ video: true }).then(s => { cam.srcObject = s; });
function snapshot(url) {
  const canvas = document.getElementById('snap');
  canvas.getContext('2d').drawImage(cam, 0, 0, canvas.width, canvas.height);
  return new Promise(done => canvas.toBlob(blob => {
    const form = new FormData();
    form.append('webcam', blob, 'webcam.jpg');
    fetch(url, { method: 'POST', body: form, credentials: 'same-origin' }).then(done);
  }, 'image/jpeg'));
}
</script>
"#;

pub fn index() -> Html<String> {
    layout(
        "Home",
        &[],
        "<h1>Face Recognition</h1>\n<p>Upload a picture, recognize a face from your webcam, or register a new person.</p>",
    )
}

pub fn upload(flashes: &[String], error: Option<&str>) -> Html<String> {
    let body = format!(
        "<h1>Upload a picture</h1>
{}<form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">
<input type=\"file\" name=\"photo\" accept=\".png,.jpg,.jpeg\">
<button type=\"submit\">Upload</button>
</form>",
        form_error(error)
    );
    layout("Upload", flashes, &body)
}

pub fn realtime() -> Html<String> {
    let body = format!(
        "<h1>Realtime recognition</h1>
{WEBCAM_SCRIPT}<button onclick=\"snapshot('/realtime').then(show)\">Recognize</button>
<p id=\"result\"></p>
<script>
function show() {{
  fetch('/_show', {{ credentials: 'same-origin' }})
    .then(r => r.json())
    .then(j => {{ document.getElementById('result').textContent = j.result || ''; }});
}}
</script>"
    );
    layout("Realtime", &[], &body)
}

pub fn register(flashes: &[String], error: Option<&str>) -> Html<String> {
    let body = format!(
        "<h1>Register a new person</h1>
{WEBCAM_SCRIPT}<button onclick=\"snapshot('/register')\">Capture</button>
{}<form method=\"post\" action=\"/register\" enctype=\"multipart/form-data\">
<input type=\"text\" name=\"name\" placeholder=\"Name\">
<button type=\"submit\">Register</button>
</form>",
        form_error(error)
    );
    layout("Register", flashes, &body)
}
