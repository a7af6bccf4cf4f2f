/// ISBN handling: validation, normalization and 10→13 conversion.
///
/// The 13-digit form is the canonical key for every record in this
/// subsystem; everything arriving from the outside (query params, vendor
/// payloads, the catalog's space-separated "isbn10 isbn13" field) passes
/// through `normalize_to_isbn13` before it is allowed near the store.

fn only_digits(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn is_valid_isbn13(s: &str) -> bool {
    let v = only_digits(s);
    if v.len() != 13 || !v.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = v.bytes().map(|b| (b - b'0') as u32).collect();
    let sum: u32 = digits[..12]
        .iter()
        .enumerate()
        .map(|(i, d)| d * if i % 2 == 1 { 3 } else { 1 })
        .sum();
    (10 - (sum % 10)) % 10 == digits[12]
}

pub fn is_valid_isbn10(s: &str) -> bool {
    let v = only_digits(s);
    if v.len() != 10 {
        return false;
    }
    let bytes = v.as_bytes();
    if !bytes[..9].iter().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = bytes[..9]
        .iter()
        .enumerate()
        .map(|(i, b)| (*b - b'0') as u32 * (10 - i as u32))
        .sum();
    let check = (11 - (sum % 11)) % 11;
    let last = match bytes[9] {
        b'X' => 10,
        b if b.is_ascii_digit() => (b - b'0') as u32,
        _ => return false,
    };
    check == last
}

/// Convert an ISBN-10 to its 978-prefixed ISBN-13 equivalent.
pub fn to_isbn13(isbn10: &str) -> String {
    let core: String = only_digits(isbn10).chars().take(9).collect();
    let base = format!("978{core}");
    let sum: u32 = base
        .bytes()
        .enumerate()
        .map(|(i, b)| (b - b'0') as u32 * if i % 2 == 1 { 3 } else { 1 })
        .sum();
    let check = (10 - (sum % 10)) % 10;
    format!("{base}{check}")
}

/// Normalize any user- or vendor-supplied ISBN string to a validated
/// ISBN-13, converting from ISBN-10 where needed. Returns `None` for
/// anything that fails the checksum.
pub fn normalize_to_isbn13(raw: &str) -> Option<String> {
    let v = only_digits(raw);
    if is_valid_isbn13(&v) {
        return Some(v);
    }
    if is_valid_isbn10(&v) {
        return Some(to_isbn13(&v));
    }
    None
}

/// The catalog vendor reports ISBNs as a single space-separated field
/// ("8937460777 9788937460777"). Pick out the 10- and 13-digit candidates.
pub fn split_isbn_field(field: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<String> = field
        .split(' ')
        .map(only_digits)
        .filter(|p| !p.is_empty())
        .collect();

    let isbn10 = parts.iter().find(|p| p.len() == 10).cloned();
    let isbn13 = parts.iter().find(|p| p.len() == 13).cloned();
    (isbn10, isbn13)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_isbn13_checksum() {
        assert!(is_valid_isbn13("9780141439518"));
        assert!(is_valid_isbn13("978-0-14-143951-8"));
        assert!(!is_valid_isbn13("9780141439519"));
        assert!(!is_valid_isbn13("97801414395"));
    }

    #[test]
    fn validates_isbn10_checksum() {
        assert!(is_valid_isbn10("0141439513"));
        assert!(is_valid_isbn10("080442957X"));
        assert!(!is_valid_isbn10("0141439514"));
    }

    #[test]
    fn converts_isbn10_to_isbn13() {
        assert_eq!(to_isbn13("0141439513"), "9780141439518");
    }

    #[test]
    fn normalizes_either_form() {
        assert_eq!(
            normalize_to_isbn13("978-0-14-143951-8").as_deref(),
            Some("9780141439518")
        );
        assert_eq!(
            normalize_to_isbn13("0141439513").as_deref(),
            Some("9780141439518")
        );
        assert_eq!(normalize_to_isbn13("not an isbn"), None);
        assert_eq!(normalize_to_isbn13(""), None);
    }

    #[test]
    fn splits_combined_vendor_field() {
        let (ten, thirteen) = split_isbn_field("8937460777 9788937460778");
        assert_eq!(ten.as_deref(), Some("8937460777"));
        assert_eq!(thirteen.as_deref(), Some("9788937460778"));

        let (ten, thirteen) = split_isbn_field("9788937460778");
        assert_eq!(ten, None);
        assert_eq!(thirteen.as_deref(), Some("9788937460778"));
    }
}
