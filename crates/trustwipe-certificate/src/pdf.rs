// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF export — a printable rendition of a certificate using `printpdf` 0.8.
//
// The PDF is a convenience copy for humans. The signed JSON stays the
// authoritative record, so the PDF carries the content hash and signer
// fingerprint for cross-checking.

use std::path::Path;

use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, TextItem,
};
use tracing::{debug, info, instrument};
use trustwipe_core::compliance::{ISO_CONTROLS, category_profile};
use trustwipe_core::error::Result;

use crate::schema::SignedCertificate;

const PAGE_W_MM: f32 = 210.0;
const PAGE_H_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const BODY_PT: f32 = 10.0;
const HEADING_PT: f32 = 12.0;
const TITLE_PT: f32 = 16.0;
const LINE_PT: f32 = 14.0;

/// One laid-out line: text plus its style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Title,
    Heading,
    Body,
}

impl Style {
    fn font(self) -> BuiltinFont {
        match self {
            Style::Title | Style::Heading => BuiltinFont::HelveticaBold,
            Style::Body => BuiltinFont::Helvetica,
        }
    }

    fn size(self) -> f32 {
        match self {
            Style::Title => TITLE_PT,
            Style::Heading => HEADING_PT,
            Style::Body => BODY_PT,
        }
    }
}

/// Renders a signed certificate onto A4 pages.
pub struct CertificatePdf<'a> {
    signed: &'a SignedCertificate,
    verify_url: Option<String>,
}

impl<'a> CertificatePdf<'a> {
    pub fn new(signed: &'a SignedCertificate) -> Self {
        Self {
            signed,
            verify_url: None,
        }
    }

    /// Print the public verification link on the certificate.
    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = Some(url.into());
        self
    }

    fn lines(&self) -> Result<Vec<(Style, String)>> {
        let cert = &self.signed.certificate;
        let mut out: Vec<(Style, String)> = Vec::new();
        let body = |out: &mut Vec<(Style, String)>, label: &str, value: String| {
            out.push((Style::Body, format!("{label}: {value}")));
        };

        out.push((Style::Title, "Data Sanitization Certificate".into()));
        body(&mut out, "Certificate ID", cert.certificate_id.to_string());
        body(&mut out, "Issued", cert.issued_at.to_rfc3339());
        if let Some(prev) = &cert.supersedes {
            body(&mut out, "Supersedes", prev.to_string());
            body(
                &mut out,
                "Amendment reason",
                cert.amendment_reason.clone().unwrap_or_default(),
            );
        }
        out.push((Style::Body, String::new()));

        out.push((Style::Heading, "Device".into()));
        body(&mut out, "Asset tag", cert.asset_tag.clone());
        body(&mut out, "Model", cert.device.model.clone());
        body(&mut out, "Serial", cert.device.serial.clone());
        body(&mut out, "Type", cert.device.drive_type.to_string());
        body(
            &mut out,
            "Capacity",
            format!("{} ({} bytes)", cert.device.capacity_label, cert.device.capacity_bytes),
        );
        body(&mut out, "Path", cert.device.path.clone());
        out.push((Style::Body, String::new()));

        out.push((Style::Heading, "Sanitization".into()));
        body(&mut out, "NIST category", cert.nist_category.to_string());
        body(&mut out, "Category", category_profile(cert.nist_category).description.to_owned());
        body(&mut out, "Algorithm", cert.algorithm.clone());
        body(&mut out, "HPA/DCO removed", yes_no(cert.hpa_dco_removed).into());
        body(&mut out, "Started", cert.start_time_utc.to_rfc3339());
        body(&mut out, "Finished", cert.end_time_utc.to_rfc3339());
        body(&mut out, "Duration", cert.duration_label());
        if let Some(op) = &cert.operator {
            body(&mut out, "Operator", op.clone());
        }
        out.push((Style::Body, String::new()));

        out.push((Style::Heading, "Verification".into()));
        let v = &cert.verification;
        body(&mut out, "Mode", v.mode.to_string());
        body(&mut out, "Coverage", format!("{}%", v.percent));
        body(&mut out, "Result", format!("{:?}", v.result).to_uppercase());
        body(&mut out, "Blocks verified", v.blocks_verified.to_string());
        body(&mut out, "Errors", v.errors.to_string());
        body(&mut out, "Run log SHA-256", cert.run_log_sha256.clone());
        out.push((Style::Body, String::new()));

        out.push((Style::Heading, "Compliance".into()));
        body(&mut out, "NIST SP 800-88", cert.compliance.nist_sp_800_88.clone());
        body(&mut out, "ISO/IEC 27040", cert.compliance.iso_iec_27040.clone());
        body(&mut out, "Rationale", cert.compliance.method_rationale.clone());
        for control in ISO_CONTROLS {
            body(&mut out, control.id, control.title.to_owned());
        }
        out.push((Style::Body, String::new()));

        out.push((Style::Heading, "Signature".into()));
        body(&mut out, "Algorithm", cert.signing.sig_alg.clone());
        body(&mut out, "Signer fingerprint", cert.signing.signer_fingerprint.clone());
        body(&mut out, "Detached signature", cert.signing.detached_signature.clone());
        body(&mut out, "Content SHA-256", self.signed.content_hash()?);
        if let Some(url) = &self.verify_url {
            body(&mut out, "Verify at", url.clone());
        }
        Ok(out)
    }

    /// Lay out and serialise the PDF.
    #[instrument(skip(self), fields(certificate = %self.signed.id()))]
    pub fn render(&self) -> Result<Vec<u8>> {
        let (page_w, page_h) = (Mm(PAGE_W_MM), Mm(PAGE_H_MM));
        let margin_pt = Mm(MARGIN_MM).into_pt().0;
        let page_h_pt = page_h.into_pt().0;
        let lines_per_page = ((page_h_pt - 2.0 * margin_pt) / LINE_PT) as usize;

        // Helvetica averages about half an em per glyph.
        let avg_char_mm = 0.5 * BODY_PT * 0.3528;
        let max_chars = ((PAGE_W_MM - 2.0 * MARGIN_MM) / avg_char_mm) as usize;

        let laid_out: Vec<(Style, String)> = self
            .lines()?
            .into_iter()
            .flat_map(|(style, text)| {
                wrap_text(&text, max_chars)
                    .into_iter()
                    .map(move |l| (style, l))
            })
            .collect();

        let mut doc = PdfDocument::new(&format!("Certificate {}", self.signed.id()));
        let mut pages = Vec::new();
        for chunk in laid_out.chunks(lines_per_page.max(1)) {
            let mut ops: Vec<Op> = Vec::new();
            for (i, (style, text)) in chunk.iter().enumerate() {
                if text.is_empty() {
                    continue;
                }
                let y_pt = page_h_pt - margin_pt - (i as f32 * LINE_PT);
                ops.push(Op::StartTextSection);
                ops.push(Op::SetTextCursor {
                    pos: Point {
                        x: Pt(margin_pt),
                        y: Pt(y_pt),
                    },
                });
                ops.push(Op::SetFontSizeBuiltinFont {
                    size: Pt(style.size()),
                    font: style.font(),
                });
                ops.push(Op::WriteTextBuiltinFont {
                    items: vec![TextItem::Text(text.clone())],
                    font: style.font(),
                });
                ops.push(Op::EndTextSection);
            }
            pages.push(PdfPage::new(page_w, page_h, ops));
        }
        doc.with_pages(pages);
        debug!(lines = laid_out.len(), pages = doc.pages.len(), "certificate laid out");

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.render()?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!(path = %path.as_ref().display(), "certificate PDF written");
        Ok(())
    }
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

/// Word-wrap `text` to at most `max_width` characters per line, breaking
/// words that are longer than a line (hashes, URLs).
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![String::new()];
    }

    let mut result = Vec::new();
    let mut current = String::new();
    for word in words {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() > max_width {
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            let mut pieces = chars.chunks(max_width).peekable();
            while let Some(piece) = pieces.next() {
                let piece: String = piece.iter().collect();
                if pieces.peek().is_some() {
                    result.push(piece);
                } else {
                    current = piece;
                }
            }
        } else if current.is_empty() {
            current.push_str(word);
        } else if current.chars().count() + 1 + chars.len() <= max_width {
            current.push(' ');
            current.push_str(word);
        } else {
            result.push(std::mem::replace(&mut current, word.to_owned()));
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::issue_certificate;
    use crate::issue::tests::{sample_run, wiped_asset};
    use trustwipe_core::types::SanitizationMethod;
    use trustwipe_security::CertificateSigner;

    #[test]
    fn wrap_breaks_long_hashes() {
        let hash = "a".repeat(70);
        let lines = wrap_text(&format!("Content SHA-256: {hash}"), 30);
        assert!(lines.iter().all(|l| l.chars().count() <= 30));
        assert_eq!(lines.concat().replace(' ', "").len(), "ContentSHA-256:".len() + 70);
    }

    #[test]
    fn wrap_keeps_short_lines() {
        assert_eq!(wrap_text("Mode: sample", 40), vec!["Mode: sample"]);
        assert_eq!(wrap_text("", 40), vec![String::new()]);
    }

    #[test]
    fn renders_readable_pdf() {
        let signer = CertificateSigner::generate().unwrap();
        let (asset, drive_id) = wiped_asset(SanitizationMethod::NvmeSanitizeBlockErase);
        let signed = issue_certificate(&asset, drive_id, &sample_run(), &signer, None).unwrap();

        let bytes = CertificatePdf::new(&signed)
            .with_verify_url(format!("https://verify.trustwipe.com/{}", signed.id()))
            .render()
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert!(!doc.get_pages().is_empty());
    }
}
