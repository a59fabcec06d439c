//! Article number normalisation for Taiwanese statute references.
//!
//! Citations arrive in many spellings of the same article: "第二十二條",
//! "22", "第 22 條", "２２", "022". Sub-articles inserted by amendment are
//! written "22之1" in the gazette and "22-1" in most databases. Everything is
//! reduced to the arabic, hyphenated form so lookups compare like with like.
//!
//! # Numbering conventions
//!
//! - Plain article: 第22條 → "22"
//! - Inserted sub-article: 第22條之1 / 第22之1條 → "22-1"
//! - CJK numerals: 一百零五 → "105", 十 → "10", 兩 → "2"

/// Normalise an article reference into canonical arabic form.
///
/// Input: "第二十二條", "22之1", "第 22-1 條", "０２２"
/// Output: "22", "22-1", "22-1", "22"
///
/// Segments that are neither arabic nor CJK numerals are kept verbatim, so
/// unusual references degrade to a trimmed string rather than an empty one.
pub fn normalize_article(s: &str) -> String {
    let compact: String = s
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(fullwidth_to_ascii)
        .collect();

    let inner = compact.strip_prefix('第').unwrap_or(&compact);
    // 第22條之1 puts the sub-article after 條; 第22之1條 puts it before.
    let inner = inner.replacen("條之", "之", 1).replacen('条', "條", 1);
    let inner = inner.strip_suffix('條').unwrap_or(&inner);

    let parts: Vec<String> = inner
        .split(['之', '-'])
        .filter(|p| !p.is_empty())
        .map(normalize_segment)
        .collect();

    if parts.is_empty() {
        return s.trim().to_string();
    }
    parts.join("-")
}

fn normalize_segment(seg: &str) -> String {
    if seg.chars().all(|c| c.is_ascii_digit()) {
        let stripped = seg.trim_start_matches('0');
        return if stripped.is_empty() { "0".into() } else { stripped.into() };
    }
    match cjk_numeral_value(seg) {
        Some(n) => n.to_string(),
        None => seg.to_string(),
    }
}

fn fullwidth_to_ascii(c: char) -> char {
    match c {
        '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
        '－' => '-',
        _ => c,
    }
}

/// Value of a CJK numeral string, or `None` if any character is not a numeral
/// or the value does not fit in a `u32`.
///
/// Handles the positional units 十, 百, 千, 萬 and the zero placeholder 零/〇.
pub fn cjk_numeral_value(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut total: u32 = 0;
    let mut section: u32 = 0;
    let mut current: u32 = 0;

    for c in s.chars() {
        match c {
            '零' | '〇' => current = 0,
            '一' | '壹' => current = 1,
            '二' | '兩' | '貳' => current = 2,
            '三' | '參' => current = 3,
            '四' | '肆' => current = 4,
            '五' | '伍' => current = 5,
            '六' | '陸' => current = 6,
            '七' | '柒' => current = 7,
            '八' | '捌' => current = 8,
            '九' | '玖' => current = 9,
            '十' | '拾' | '百' | '佰' | '千' | '仟' => {
                let unit = match c {
                    '十' | '拾' => 10,
                    '百' | '佰' => 100,
                    _ => 1000,
                };
                let digit = if current == 0 { 1 } else { current };
                section = section.checked_add(digit.checked_mul(unit)?)?;
                current = 0;
            }
            '萬' => {
                let group = section.checked_add(current)?.checked_mul(10_000)?;
                total = total.checked_add(group)?;
                section = 0;
                current = 0;
            }
            _ => return None,
        }
    }
    total.checked_add(section)?.checked_add(current)
}

/// Lexicographically sortable key for a normalised article number.
///
/// "22" → "0022.000", "22-1" → "0022.001". Non-numeric references sort last.
pub fn article_sort_key(s: &str) -> String {
    let norm = normalize_article(s);
    let mut parts = norm.split('-');
    let main = parts.next().and_then(|p| p.parse::<u32>().ok());
    let sub = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(0);
    match main {
        Some(m) => format!("{m:04}.{sub:03}"),
        None => format!("9999.999~{norm}"),
    }
}
