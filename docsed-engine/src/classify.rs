//! Deciding what kind of edit a match wants.
//!
//! Each match is one of four shapes, checked in priority order: its expanded
//! replacement is an image-insertion literal; the directive carries an
//! image-reference attribute; an attribute set supplies explicit formatting;
//! or the replacement goes through the markdown layer, where a footnote tag
//! reclassifies the match one last time.

use docsed_parser::{Directive, ImageSpec, Rendered, parse_image_literal, render};

use crate::matcher::TextMatch;

/// Where an inserted image comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageSource {
    /// An insertion literal in the replacement text.
    Literal(ImageSpec),
    /// An `img=` attribute naming a source out of band.
    Reference(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum MatchClass {
    Image(ImageSource),
    /// An attribute set (and possibly inline spans) drives the formatting;
    /// the replacement text is taken literally.
    Rich,
    /// Plain or markdown-formatted text, with its rendered form.
    Markdown(Rendered),
    /// A footnote to create and populate with the rendered text.
    Footnote(String),
}

#[derive(Clone, Debug)]
pub struct Classified {
    pub m: TextMatch,
    pub class: MatchClass,
}

/// Classify one match.
#[must_use]
pub fn classify(m: TextMatch, directive: &Directive) -> Classified {
    if let Some(spec) = parse_image_literal(&m.replacement) {
        return Classified {
            m,
            class: MatchClass::Image(ImageSource::Literal(spec)),
        };
    }
    if let Some(reference) = directive
        .attributes
        .as_ref()
        .and_then(|a| a.image.as_ref())
    {
        return Classified {
            class: MatchClass::Image(ImageSource::Reference(reference.clone())),
            m,
        };
    }
    if directive.attributes.is_some() || !directive.spans.is_empty() {
        return Classified {
            m,
            class: MatchClass::Rich,
        };
    }
    let rendered = render(&m.replacement);
    if rendered.is_footnote() {
        return Classified {
            class: MatchClass::Footnote(rendered.text),
            m,
        };
    }
    Classified {
        m,
        class: MatchClass::Markdown(rendered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsed_parser::parse;
    use pretty_assertions::assert_eq;

    fn match_with(replacement: &str) -> TextMatch {
        TextMatch {
            start: 0,
            end: 4,
            original: "orig".to_string(),
            replacement: replacement.to_string(),
        }
    }

    #[test]
    fn image_literal_wins_over_attributes() {
        let d = parse("s#a#![x](https://e.com/x.png)#{b}").unwrap();
        let c = classify(match_with("![x](https://e.com/x.png)"), &d);
        assert!(matches!(
            c.class,
            MatchClass::Image(ImageSource::Literal(_))
        ));
    }

    #[test]
    fn image_reference_attribute() {
        let d = parse("s/a/b/{img=https://e.com/x.png}").unwrap();
        let c = classify(match_with("b"), &d);
        assert!(matches!(
            c.class,
            MatchClass::Image(ImageSource::Reference(url)) if url == "https://e.com/x.png"
        ));
    }

    #[test]
    fn attribute_set_makes_rich_text() {
        let d = parse("s/a/**b**/{u}").unwrap();
        let c = classify(match_with("**b**"), &d);
        // Rich text takes the replacement literally; markdown is not parsed.
        assert_eq!(c.class, MatchClass::Rich);
    }

    #[test]
    fn markdown_with_footnote_reclassifies() {
        let d = parse("s/a/^[source: survey]/").unwrap();
        let c = classify(match_with("^[source: survey]"), &d);
        assert!(matches!(c.class, MatchClass::Footnote(text) if text == "source: survey"));
    }

    #[test]
    fn plain_text_is_markdown_with_no_tags() {
        let d = parse("s/a/b/").unwrap();
        let c = classify(match_with("b"), &d);
        if let MatchClass::Markdown(rendered) = c.class {
            assert_eq!(rendered.text, "b");
            assert!(rendered.tags.is_empty());
        } else {
            panic!("expected markdown class");
        }
    }
}
