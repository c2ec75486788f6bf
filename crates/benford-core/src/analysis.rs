//! Per-kind page folding and results artifact rendering.

use std::fmt::Write as _;

use crate::digits::{BenfordReport, DigitHistogram, tally_page};
use crate::job::AnalysisKind;
use crate::nlp::{Entity, NlpService, PiiEntity, SentimentResult, truncate_to_bytes};
use crate::CoreError;

/// Running state of one document's analysis. Owned by a single worker run.
#[derive(Debug, Clone)]
pub enum Analysis {
    Benford(DigitHistogram),
    /// Text collected for an NLP kind.
    Text { kind: AnalysisKind, text: String },
}

impl Analysis {
    pub fn new(kind: AnalysisKind) -> Self {
        match kind {
            AnalysisKind::Benford => Analysis::Benford(DigitHistogram::new()),
            kind => Analysis::Text {
                kind,
                text: String::new(),
            },
        }
    }

    /// Fold one page of text into the running state.
    pub fn fold_page(&mut self, page_text: &str) {
        match self {
            Analysis::Benford(histogram) => histogram.merge(&tally_page(page_text)),
            Analysis::Text { text, .. } => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(page_text);
            }
        }
    }

    /// Produce the results artifact for a document of `pages` pages.
    ///
    /// NLP kinds send at most `max_text_bytes` of text to `nlp`.
    pub async fn finish(
        self,
        pages: usize,
        nlp: Option<&dyn NlpService>,
        max_text_bytes: usize,
    ) -> Result<String, CoreError> {
        let (kind, text) = match self {
            Analysis::Benford(histogram) => {
                return Ok(BenfordReport::new(pages, histogram).render());
            }
            Analysis::Text { kind, text } => (kind, text),
        };

        let nlp = nlp.ok_or(CoreError::NlpUnavailable(kind))?;
        let text = truncate_to_bytes(&text, max_text_bytes);
        if text.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "document has no text to analyze".into(),
            ));
        }

        match kind {
            AnalysisKind::Sentiment => Ok(render_sentiment(&nlp.sentiment(text).await?)),
            AnalysisKind::Ner => Ok(render_entities(&nlp.entities(text).await?)),
            AnalysisKind::Pii => Ok(render_pii(&nlp.pii_entities(text).await?)),
            AnalysisKind::Benford => Err(CoreError::InvalidInput(
                "benford documents are not sent to the NLP service".into(),
            )),
        }
    }
}

pub fn render_sentiment(result: &SentimentResult) -> String {
    let s = &result.sentiment_score;
    let mut out = String::from("**RESULTS**\n**Sentiment Analysis**\n");
    let _ = writeln!(out, "Sentiment: {}", result.sentiment);
    out.push_str("Sentiment scores:\n");
    let _ = writeln!(out, "Positive: {}", s.positive);
    let _ = writeln!(out, "Negative: {}", s.negative);
    let _ = writeln!(out, "Neutral: {}", s.neutral);
    let _ = writeln!(out, "Mixed: {}", s.mixed);
    out
}

pub fn render_entities(entities: &[Entity]) -> String {
    let mut out = String::from("**RESULTS**\n**Name Entity Recognition**\n");
    for e in entities {
        let _ = write!(
            out,
            "Type: {}\nText: {}\nScore: {}\n\n",
            e.kind, e.text, e.score
        );
    }
    out
}

pub fn render_pii(entities: &[PiiEntity]) -> String {
    let mut out = String::from("**RESULTS**\n**Personally Identifiable Entities**\n");
    for e in entities {
        let _ = write!(out, "Type: {}\nScore: {}\n\n", e.kind, e.score);
    }
    out
}
