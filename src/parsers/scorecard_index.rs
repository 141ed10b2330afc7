use crate::error::{PortalError, Result};
use crate::models::{ScorecardId, ScorecardSummary};
use crate::parsers::document::{Document, Pattern, query_param};
use std::collections::HashSet;
use std::sync::LazyLock;

static TREE_CONTAINER: LazyLock<Pattern> =
    LazyLock::new(|| Pattern::parse("ul.treelist").expect("invalid pattern: tree container"));

static SCORECARD_LINK: LazyLock<Pattern> = LazyLock::new(|| {
    Pattern::parse(r#"a[title^="Leistungen"][href]"#).expect("invalid pattern: scorecard link")
});

/// Parses the scorecard tree page into its scorecards, in page order.
///
/// A tree without scorecard links is a valid, empty index. A page without the
/// tree at all is not the index page.
pub fn parse_scorecard_index(html: &str) -> Result<Vec<ScorecardSummary>> {
    let document = Document::parse(html);
    let containers = document.find_all(&TREE_CONTAINER);

    if containers.is_empty() {
        return Err(PortalError::UnexpectedPortalResponse(
            "scorecard tree not found on index page".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut scorecards = Vec::new();

    for link in containers.iter().flat_map(|c| c.find_all(&SCORECARD_LINK)) {
        let Some(node_id) = link.attr("href").and_then(|href| query_param(href, "nodeID")) else {
            tracing::debug!("skipping scorecard link without nodeID");
            continue;
        };

        // Nested tree lists would yield the same link twice.
        if !seen.insert(node_id.clone()) {
            continue;
        }

        let title = link
            .parent()
            .map(|parent| parent.text())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| link.text());

        scorecards.push(ScorecardSummary {
            id: ScorecardId::new(node_id),
            title,
        });
    }

    Ok(scorecards)
}
