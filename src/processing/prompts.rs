//! Prompt templates for the three kinds of completion calls.

use std::path::Path;
use thiserror::Error;

/// Placeholder replaced with the text being summarized.
pub const TEXT_PLACEHOLDER: &str = "{text}";

const MAP_TEMPLATE: &str = "Condense the following excerpt of a larger document into a short, \
factual summary. Keep names, dates, amounts, obligations and defined terms. Do not add \
information that is not in the excerpt.\n\n\"{text}\"\n\nCONDENSED EXCERPT:";

const COMBINE_TEMPLATE: &str = "The following are condensed summaries of consecutive parts of \
one document, separated by \"---\". Merge them into a single condensed summary that keeps every \
important fact and preserves their order. Do not add information that is not in the \
summaries.\n\n{text}\n\nCONDENSED SUMMARY:";

const FINAL_TEMPLATE: &str = r#"You are a professional documents summarizer, who will create a concise and comprehensive summary of the provided legal document while adhering to these guidelines:

If you feel that the document uploaded is unethical or not within ethical boundaries then do not generate summary for that.

Craft a summary that is detailed, thorough, in-depth, and complex, while maintaining clarity and conciseness.

Incorporate main ideas and essential information, eliminating extraneous language and focusing on critical aspects.

Rely strictly on the provided text, without including external information.

Format the summary in paragraphs form for easy understanding.

Remember to have a minimum of 2 paragraphs for every summary.

Remember to name the category of the document once it is summarized, based on your creativity, on the last line in markdown table format.
For example:
If the document summary comes like Blog on Nature,
You would say: | Category of the Document | Nature |
If the document summary comes like Home Agreement Paper,
You would say: | Category of the Document | Legal Home Document |

By following these guidelines, you will generate an effective summary that encapsulates the essence of the given text in a clear, concise, and reader-friendly manner.

{text}

Summary:
"#;

/// Errors raised when loading or validating templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template has nowhere to put the document text.
    #[error("prompt template for {0:?} pass is missing the {{text}} placeholder")]
    MissingPlaceholder(PassKind),
    /// Template file could not be read.
    #[error("failed to read prompt template {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Which kind of completion call a prompt is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Per-chunk condensation.
    Map,
    /// Intermediate merge of partial summaries.
    Combine,
    /// Document-level structured summary.
    Final,
}

/// A prompt with a single `{text}` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    fn parse(pass: PassKind, template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        if !template.contains(TEXT_PLACEHOLDER) {
            return Err(TemplateError::MissingPlaceholder(pass));
        }
        Ok(Self { template })
    }

    /// Substitute `text` into the template.
    pub fn render(&self, text: &str) -> String {
        self.template.replacen(TEXT_PLACEHOLDER, text, 1)
    }
}

/// Template for each pass kind, injectable for tests and deployments.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    map: PromptTemplate,
    combine: PromptTemplate,
    final_pass: PromptTemplate,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            map: PromptTemplate {
                template: MAP_TEMPLATE.into(),
            },
            combine: PromptTemplate {
                template: COMBINE_TEMPLATE.into(),
            },
            final_pass: PromptTemplate {
                template: FINAL_TEMPLATE.into(),
            },
        }
    }
}

impl PromptTemplates {
    /// Replace the template for one pass kind.
    pub fn with_template(
        mut self,
        pass: PassKind,
        template: impl Into<String>,
    ) -> Result<Self, TemplateError> {
        let parsed = PromptTemplate::parse(pass, template)?;
        match pass {
            PassKind::Map => self.map = parsed,
            PassKind::Combine => self.combine = parsed,
            PassKind::Final => self.final_pass = parsed,
        }
        Ok(self)
    }

    /// Replace the final-pass template with the contents of `path`.
    pub fn with_final_template_file(self, path: &Path) -> Result<Self, TemplateError> {
        let template = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.with_template(PassKind::Final, template)
    }

    /// Template for the given pass kind.
    pub fn for_pass(&self, pass: PassKind) -> &PromptTemplate {
        match pass {
            PassKind::Map => &self.map,
            PassKind::Combine => &self.combine,
            PassKind::Final => &self.final_pass,
        }
    }

    /// Render the template for `pass` around `text`.
    pub fn render(&self, pass: PassKind, text: &str) -> String {
        self.for_pass(pass).render(text)
    }
}
