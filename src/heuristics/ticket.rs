//! Guide-number tiers. Each tier only runs when the ones before it found
//! nothing.

use super::{ReceiptText, Strategy, fold};
use regex::Regex;

pub(super) const TICKET_TIERS: &[(&str, Strategy<String>)] = &[
    ("guide_keyword", guide_keyword_window),
    ("longest_run", longest_untaxed_run),
    ("internal_code", internal_code_line),
];

/// "guia" / "transporte" / "vehiculo" and the ways OCR tends to mangle them,
/// in priority order.
const GUIDE_KEYWORDS: &[&str] = &[
    "guia", "transp", "vehi", "gula", "cuia", "cul - ae", "vehicu", "ranspor", "ansp",
];
/// Characters scanned after a guide keyword.
const GUIDE_WINDOW: usize = 150;
/// Context around a bare digit run checked for a tax-ID label.
const CONTEXT_BEFORE: usize = 40;
const CONTEXT_AFTER: usize = 10;

/// Tier A: the first 9-12 digit run shortly after a guide keyword, ignoring
/// anything from "codigo" or "nit" onwards.
fn guide_keyword_window(text: &ReceiptText<'_>) -> Option<String> {
    let re = Regex::new(r"[0-9]{9,12}").ok()?;

    GUIDE_KEYWORDS.iter().find_map(|keyword| {
        let start = text.folded.find(keyword)?;
        let window = take_chars(&text.folded[start..], GUIDE_WINDOW);
        let window = cut_at(cut_at(window, "codigo"), "nit");
        re.find(window).map(|m| m.as_str().to_string())
    })
}

/// Tier B: the longest digit run (9+) that is not labelled as a NIT. Runs of
/// equal length keep reading order.
fn longest_untaxed_run(text: &ReceiptText<'_>) -> Option<String> {
    let re = Regex::new(r"[0-9]{5,15}").ok()?;

    let mut runs: Vec<_> = re.find_iter(text.raw).collect();
    runs.sort_by(|a, b| b.len().cmp(&a.len()));

    runs.into_iter()
        .filter(|run| run.len() >= 9)
        .find(|run| {
            let from = chars_back(text.raw, run.start(), CONTEXT_BEFORE);
            let to = chars_forward(text.raw, run.end(), CONTEXT_AFTER);
            !text.raw[from..to].to_lowercase().contains("nit")
        })
        .map(|run| run.as_str().to_string())
}

/// Tier C: a 4-9 digit internal code from a "codigo" / "interno" line.
fn internal_code_line(text: &ReceiptText<'_>) -> Option<String> {
    let re = Regex::new(r"[0-9]{4,9}").ok()?;

    text.lines
        .iter()
        .filter(|line| {
            let folded = fold(line);
            folded.contains("codigo") || folded.contains("interno")
        })
        .find_map(|line| re.find(line))
        .map(|m| m.as_str().to_string())
}

fn cut_at<'a>(s: &'a str, marker: &str) -> &'a str {
    s.find(marker).map_or(s, |i| &s[..i])
}

fn take_chars(s: &str, n: usize) -> &str {
    s.char_indices().nth(n).map_or(s, |(i, _)| &s[..i])
}

/// Byte offset `n` characters before `at` (clamped to the start).
fn chars_back(s: &str, at: usize, n: usize) -> usize {
    if n == 0 {
        return at;
    }
    s[..at].char_indices().rev().nth(n - 1).map_or(0, |(i, _)| i)
}

/// Byte offset `n` characters after `at` (clamped to the end).
fn chars_forward(s: &str, at: usize, n: usize) -> usize {
    s[at..].char_indices().nth(n).map_or(s.len(), |(i, _)| at + i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(strategy: Strategy<String>, text: &str) -> Option<String> {
        strategy(&ReceiptText::new(text))
    }

    #[test]
    fn test_tier_a_stops_before_codigo() {
        let text = "GUIA DE TRANSPORTE VEHICULO 1000082175 CODIGO 884";
        assert_eq!(tier(guide_keyword_window, text).as_deref(), Some("1000082175"));
    }

    #[test]
    fn test_tier_a_ignores_code_after_marker() {
        let text = "Guía transporte\nCódigo interno 123456789012";
        assert_eq!(tier(guide_keyword_window, text), None);
    }

    #[test]
    fn test_tier_a_reads_accented_and_misread_keywords() {
        assert_eq!(
            tier(guide_keyword_window, "GUÍA No. 2000045678").as_deref(),
            Some("2000045678")
        );
        assert_eq!(
            tier(guide_keyword_window, "GULA 3000011223 ").as_deref(),
            Some("3000011223")
        );
    }

    #[test]
    fn test_tier_a_window_is_bounded() {
        let far = format!("GUIA {} 1000082175", "x".repeat(200));
        assert_eq!(tier(guide_keyword_window, &far), None);
    }

    #[test]
    fn test_tier_a_later_keyword_used_when_first_window_is_empty() {
        // "guia" window is cut at "nit"; "vehi" has its own window.
        let text = "GUIA NIT 900123456\n................................................\
            ......................................................................\
            ....................\nVEHICULO PLACA XYZ 1000082175";
        assert_eq!(tier(guide_keyword_window, text).as_deref(), Some("1000082175"));
    }

    #[test]
    fn test_tier_b_skips_nit_context() {
        let text = "EXTRACTORA DEL NORTE\nNIT 900123456\n\
            ------------------------------------------------\n\
            TICKET 0001234567";
        assert_eq!(tier(guide_keyword_window, text), None);
        assert_eq!(tier(longest_untaxed_run, text).as_deref(), Some("0001234567"));
    }

    #[test]
    fn test_tier_b_prefers_longest_then_earliest() {
        let text = "REF 123456789 LOTE 11112222333 BASCULA 44445555666";
        assert_eq!(tier(longest_untaxed_run, text).as_deref(), Some("11112222333"));
    }

    #[test]
    fn test_tier_b_needs_nine_digits() {
        assert_eq!(tier(longest_untaxed_run, "interno 12345678"), None);
    }

    #[test]
    fn test_tier_c_internal_code() {
        let text = "Tiquete de bascula\nCÓDIGO INTERNO: 884213\nPeso 12";
        assert_eq!(tier(internal_code_line, text).as_deref(), Some("884213"));
    }

    #[test]
    fn test_tiers_in_order() {
        let text = "CODIGO 4455\nREF 0012345678";
        let hit = TICKET_TIERS
            .iter()
            .find_map(|(name, strategy)| strategy(&ReceiptText::new(text)).map(|v| (*name, v)));
        assert_eq!(hit, Some(("longest_run", "0012345678".to_string())));
    }

    #[test]
    fn test_char_offsets_respect_utf8() {
        let s = "ñandú 123";
        let at = s.find('1').unwrap();
        assert_eq!(&s[chars_back(s, at, 3)..at], "dú ");
        assert_eq!(chars_back(s, at, 99), 0);
        assert_eq!(chars_forward(s, at, 50), s.len());
        assert_eq!(take_chars("áé", 1), "á");
    }
}
