//! Relevance prompt template and rendering.

/// Instruction sent once per content chunk.
/// Placeholders: {user_prompt}, {links}, {content}
pub const RELEVANT_LINKS_TEMPLATE: &str = r#"You are a website scraper and you have just scraped the following content from a website.

You are now tasked with identifying all hyperlinks within the content that are potentially
relevant to the user task: {user_prompt}

Assume relevance broadly, including any links that might be related or potentially useful
in relation to the task.

Please list only valid URLs and make sure to err on the side of inclusion if it's uncertain
whether the content at the link is directly relevant.

This is the list of links: {links}

Content: {content}

The output should be a dictionary in YAML format whose key is the link and the value is a short
description or a slug relevant for the link; if no such description or slug can be learnt from
the scraped content, just leave it null.
EXAMPLE:
    ENDPOINT1: description1
    ENDPOINT2: description2
    ..."#;

/// Substitute `{name}` placeholders in one pass.
///
/// Substituted values are never rescanned, so a chunk that happens to contain
/// `{links}` stays as written. Placeholders without a value are left as is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render the relevance instruction for one chunk.
///
/// Links are listed as a JSON array so the model sees exact URL strings.
pub fn render_relevant_links_prompt(user_prompt: &str, links: &[String], chunk: &str) -> String {
    let links_list = serde_json::to_string(links).unwrap_or_else(|_| links.join(", "));
    render(
        RELEVANT_LINKS_TEMPLATE,
        &[
            ("user_prompt", user_prompt),
            ("links", &links_list),
            ("content", chunk),
        ],
    )
}
