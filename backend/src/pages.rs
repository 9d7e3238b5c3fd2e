//! Server-rendered result and error pages for the HTML form flow.

use crate::error::EncodeError;
use crate::models::ChurnPrediction;

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<main>
{body}
<p><a href="/assesment">New assessment</a> &middot; <a href="/">Home</a></p>
</main>
</body>
</html>
"#,
        title = escape_html(title),
        body = body
    )
}

pub fn render_result(prediction: &ChurnPrediction) -> String {
    let verdict = if prediction.churn {
        "This customer is likely to churn"
    } else {
        "This customer is likely to stay"
    };

    let mut rows = String::new();
    for field in &prediction.features {
        let label = if field.label.is_empty() {
            &field.name
        } else {
            &field.label
        };
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            escape_html(label),
            field.value
        ));
    }

    let body = format!(
        r#"<h1 class="{class}">{verdict}</h1>
<p class="probability">Churn probability: <strong>{percent:.1}%</strong></p>
<p>Risk level: <strong>{risk}</strong> (threshold {threshold:.2})</p>
<p>{recommendation}</p>
<details>
<summary>Model input</summary>
<table>
{rows}</table>
</details>
<p class="meta">Model {version} &middot; {timestamp}</p>"#,
        class = if prediction.churn { "churn" } else { "stay" },
        verdict = verdict,
        percent = prediction.probability * 100.0,
        risk = prediction.risk_level.as_str(),
        threshold = prediction.threshold,
        recommendation = escape_html(&prediction.recommendation),
        rows = rows,
        version = escape_html(&prediction.model_version),
        timestamp = escape_html(&prediction.timestamp),
    );

    layout("Churn prediction", &body)
}

pub fn render_errors(problems: &[EncodeError]) -> String {
    let mut items = String::new();
    for problem in problems {
        items.push_str(&format!("<li>{}</li>\n", escape_html(&problem.to_string())));
    }

    let body = format!(
        "<h1>The form could not be processed</h1>\n<ul class=\"errors\">\n{}</ul>",
        items
    );
    layout("Invalid input", &body)
}

pub fn render_failure(message: &str) -> String {
    let body = format!(
        "<h1>Prediction failed</h1>\n<p>{}</p>",
        escape_html(message)
    );
    layout("Prediction failed", &body)
}
