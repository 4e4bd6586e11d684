// src/render/text.rs

//! Plain-text post-processing and description extraction

use super::html::dedent;

/// Localized spellings of the NAME section heading, by base language
const NAME_HEADINGS: &[(&str, &[&str])] = &[
    ("ar", &["الاسم"]),
    ("bn", &["নাম"]),
    ("ca", &["NOM"]),
    ("cs", &["JMÉNO", "NÁZEV"]),
    ("da", &["NAVN"]),
    ("de", &["BEZEICHNUNG"]),
    ("el", &["ΌΝΟΜΑ"]),
    ("eo", &["NOMO"]),
    ("es", &["NOMBRE"]),
    ("et", &["NIMI"]),
    ("fi", &["NIMI"]),
    ("fr", &["NOM"]),
    ("gl", &["NOME"]),
    ("hr", &["IME"]),
    ("hu", &["NÉV"]),
    ("id", &["NAMA"]),
    ("it", &["NOME"]),
    ("ja", &["名前"]),
    ("ko", &["이름"]),
    ("lt", &["PAVADINIMAS"]),
    ("nb", &["NAVN"]),
    ("nl", &["NAAM"]),
    ("pl", &["NAZWA"]),
    ("pt", &["NOME"]),
    ("ro", &["NUME"]),
    ("ru", &["ИМЯ", "НАЗВАНИЕ"]),
    ("sk", &["NÁZOV"]),
    ("sl", &["IME"]),
    ("sr", &["НАЗИВ", "ИМЕ", "IME"]),
    ("sv", &["NAMN"]),
    ("ta", &["பெயர்"]),
    ("tr", &["İSİM", "AD"]),
    ("uk", &["НАЗВА", "НОМИ", "NOMI"]),
    ("vi", &["TÊN"]),
    ("zh", &["名称", "名字", "名稱"]),
];

/// Paragraphs of the NAME section kept as the description
const MAX_DESCRIPTION_PARAGRAPHS: usize = 2;

/// Drop backspace overstrike (`X\bX` bold, `_\bX` underline)
pub fn strip_overstrike(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\u{8}' {
            out.pop();
        } else {
            out.push(c);
        }
    }
    out
}

/// Language part of a locale (`pt_BR` → `pt`, `sr@latin` → `sr`)
fn base_language(locale: &str) -> &str {
    let lang = locale.split('_').next().unwrap_or(locale);
    lang.split('@').next().unwrap_or(lang)
}

fn is_name_heading(line: &str, locale: &str) -> bool {
    if line.eq_ignore_ascii_case("NAME") {
        return true;
    }
    let lang = base_language(locale);
    NAME_HEADINGS
        .iter()
        .find(|(code, _)| *code == lang)
        .is_some_and(|(_, names)| {
            names
                .iter()
                .any(|name| line.to_lowercase() == name.to_lowercase())
        })
}

/// Short description from the NAME section of a rendered page
///
/// The section runs from a heading line that is exactly NAME (or its
/// localized form) to the next line starting in column one. At most two
/// paragraphs are kept. A NAME section that is never closed yields None.
pub fn extract_description(text: &str, locale: &str) -> Option<String> {
    let mut lines = text.lines();
    lines.by_ref().find(|line| is_name_heading(line, locale))?;

    let mut body = Vec::new();
    let mut closed = false;
    for line in lines {
        if line.chars().next().is_some_and(|c| !c.is_whitespace()) {
            closed = true;
            break;
        }
        body.push(line);
    }
    if !closed {
        return None;
    }

    let body = body.join("\n");
    let description = dedent(body.trim_matches('\n'));
    let description = description
        .split("\n\n")
        .take(MAX_DESCRIPTION_PARAGRAPHS)
        .collect::<Vec<_>>()
        .join("\n\n");

    if description.trim().is_empty() {
        None
    } else {
        Some(description)
    }
}
