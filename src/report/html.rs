use anyhow::Result;
use polars::prelude::*;

const STYLE: &str = "body{font-family:Arial,Helvetica,sans-serif;margin:24px}\
table{border-collapse:collapse;width:100%}\
td,th{border:1px solid #ddd;padding:6px}th{background:#eee}\
.info{margin:8px 0;color:#444}";

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Whole numbers print without a fraction, others with at most four decimals.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value);
    }
    let text = format!("{:.4}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Display text of every cell in a column; nulls render empty.
pub fn column_text(column: &Column) -> Result<Vec<String>> {
    let values = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect(),
        DataType::Float32 | DataType::Float64 => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map(format_float).unwrap_or_default())
            .collect(),
        _ => column
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect(),
    };
    Ok(values)
}

/// Render a frame as an HTML table, optionally limited to the first rows.
pub fn frame_table(df: &DataFrame, limit: Option<usize>) -> Result<String> {
    let rows = limit.map_or(df.height(), |n| n.min(df.height()));
    let cells: Vec<Vec<String>> = df
        .get_columns()
        .iter()
        .map(column_text)
        .collect::<Result<_>>()?;

    let mut html = String::from("<table>\n<thead><tr>");
    for name in df.get_column_names() {
        html.push_str(&format!("<th>{}</th>", escape(name.as_str())));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in 0..rows {
        html.push_str("<tr>");
        for column in &cells {
            html.push_str(&format!("<td>{}</td>", escape(&column[row])));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>\n");
    Ok(html)
}

/// Minimal standalone page built from ordered sections.
pub struct HtmlPage {
    title: String,
    body: String,
}

impl HtmlPage {
    pub fn new(title: &str) -> Self {
        HtmlPage {
            title: title.to_string(),
            body: format!("<h1>{}</h1>\n", escape(title)),
        }
    }

    pub fn heading(&mut self, text: &str) -> &mut Self {
        self.body.push_str(&format!("<h2>{}</h2>\n", escape(text)));
        self
    }

    pub fn info(&mut self, text: &str) -> &mut Self {
        self.body
            .push_str(&format!("<div class=\"info\">{}</div>\n", escape(text)));
        self
    }

    pub fn table(&mut self, df: &DataFrame, limit: Option<usize>) -> Result<&mut Self> {
        self.body.push_str(&frame_table(df, limit)?);
        Ok(self)
    }

    pub fn footer(&mut self, text: &str) -> &mut Self {
        self.body
            .push_str(&format!("<hr><p>{}</p>\n", escape(text)));
        self
    }

    pub fn render(&self) -> String {
        format!(
            "<!doctype html><html><head><meta charset=\"utf-8\">\
             <title>{}</title><style>{}</style></head><body>\n{}</body></html>\n",
            escape(&self.title),
            STYLE,
            self.body
        )
    }
}
