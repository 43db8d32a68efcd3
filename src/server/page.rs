use super::store::StoredVariant;

/// Values shown by the upload page.
#[derive(Debug, Clone, Default)]
pub struct PageContext<'a> {
    pub cluster_min: usize,
    pub cluster_max: usize,
    pub cluster_ceiling: usize,
    /// Route of the uploaded image, shown ahead of the variants.
    pub original: Option<&'a str>,
    pub variants: &'a [StoredVariant],
}

pub fn render_index(ctx: &PageContext<'_>) -> String {
    let mut html = String::with_capacity(2048);
    html.push_str(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>KNN Image Styler</title>\n<style>\n\
         body { font-family: sans-serif; margin: 2rem; }\n\
         .grid { display: flex; flex-wrap: wrap; gap: 1rem; }\n\
         figure { margin: 0; }\n\
         figure img { max-width: 280px; display: block; }\n\
         .swatch { display: inline-block; width: 14px; height: 14px; border: 1px solid #444; }\n\
         </style>\n</head>\n<body>\n<h1>KNN Image Styler</h1>\n",
    );

    html.push_str(&format!(
        "<form action=\"/style\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"file\" accept=\"image/*\" required>\n\
         <label>Min clusters <input type=\"number\" name=\"cluster_min\" min=\"1\" max=\"{ceiling}\" value=\"{min}\"></label>\n\
         <label>Max clusters <input type=\"number\" name=\"cluster_max\" min=\"1\" max=\"{ceiling}\" value=\"{max}\"></label>\n\
         <button type=\"submit\">Stylize</button>\n</form>\n",
        ceiling = ctx.cluster_ceiling,
        min = ctx.cluster_min,
        max = ctx.cluster_max,
    ));

    if !ctx.variants.is_empty() {
        html.push_str(&format!(
            "<h2>Results ({}&ndash;{} clusters)</h2>\n<div class=\"grid\">\n",
            ctx.cluster_min, ctx.cluster_max
        ));
        if let Some(original) = ctx.original {
            html.push_str(&format!(
                "<figure>\n<a href=\"{path}\"><img src=\"{path}\" alt=\"original\"></a>\n\
                 <figcaption>Original</figcaption>\n</figure>\n",
                path = escape(original),
            ));
        }
        for variant in ctx.variants {
            html.push_str(&format!(
                "<figure>\n<a href=\"{path}\"><img src=\"{path}\" alt=\"{k} clusters\"></a>\n\
                 <figcaption>{k} Clusters<br>",
                path = escape(&variant.path),
                k = variant.clusters,
            ));
            for hex in &variant.palette {
                let hex = escape(hex);
                html.push_str(&format!(
                    "<span class=\"swatch\" title=\"#{hex}\" style=\"background:#{hex}\"></span>"
                ));
            }
            html.push_str("</figcaption>\n</figure>\n");
        }
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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
