#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use crate::sort::tests::helpers::*;
    use crate::{AttrType, KeyComparator, SortOrder, parse_int_key};

    fn int_asc() -> KeyComparator {
        KeyComparator::new(0, KEY_LEN, AttrType::Integer, SortOrder::Ascending)
    }

    // ----------------------------------------------------------------
    // Integer keys
    // ----------------------------------------------------------------

    #[test]
    fn parse_int_key_trims_padding() {
        assert_eq!(parse_int_key(b"      42"), Some(42));
        assert_eq!(parse_int_key(b"42\0\0\0\0\0\0"), Some(42));
        assert_eq!(parse_int_key(b"  -17\0\0\0"), Some(-17));
        assert_eq!(parse_int_key(b"+5"), Some(5));
        assert_eq!(parse_int_key(b"0"), Some(0));
    }

    #[test]
    fn parse_int_key_rejects_garbage() {
        assert_eq!(parse_int_key(b""), None);
        assert_eq!(parse_int_key(b"        "), None);
        assert_eq!(parse_int_key(b"\0\0\0\0"), None);
        assert_eq!(parse_int_key(b"12ab"), None);
        assert_eq!(parse_int_key(b"1 2"), None);
        assert_eq!(parse_int_key(b"0x10"), None);
        assert_eq!(parse_int_key(&[0xff, 0xfe]), None);
    }

    #[test]
    fn parse_int_key_rejects_overflow() {
        assert_eq!(parse_int_key(b"9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_int_key(b"9223372036854775808"), None);
    }

    /// Numeric, not lexicographic: "9" < "10" and negatives first.
    #[test]
    fn integer_keys_compare_numerically() {
        let cmp = int_asc();
        let nine = int_record(9, "a");
        let ten = int_record(10, "b");
        let minus = int_record(-100, "c");

        assert_eq!(cmp.compare(&nine, &ten), Ordering::Less);
        assert_eq!(cmp.compare(&ten, &nine), Ordering::Greater);
        assert_eq!(cmp.compare(&minus, &nine), Ordering::Less);
        assert_eq!(cmp.compare(&nine, &int_record(9, "z")), Ordering::Equal);
    }

    /// Differently padded spellings of one value are equal.
    #[test]
    fn integer_padding_does_not_affect_order() {
        let cmp = KeyComparator::new(0, 4, AttrType::Integer, SortOrder::Ascending);
        assert_eq!(cmp.compare(b"  42", b"42\0\0"), Ordering::Equal);
        assert_eq!(cmp.compare(b" 042", b"  42"), Ordering::Equal);
    }

    #[test]
    fn descending_reverses_integer_order() {
        let cmp = KeyComparator::new(0, KEY_LEN, AttrType::Integer, SortOrder::Descending);
        let a = int_record(1, "");
        let b = int_record(2, "");
        assert_eq!(cmp.compare(&a, &b), Ordering::Greater);
        assert_eq!(cmp.compare(&b, &a), Ordering::Less);
        assert_eq!(cmp.compare(&a, &a), Ordering::Equal);
    }

    /// Invalid keys sort before valid ones and among themselves by bytes,
    /// so the order stays total.
    #[test]
    fn invalid_integer_keys_sort_first() {
        let cmp = KeyComparator::new(0, 4, AttrType::Integer, SortOrder::Ascending);
        assert!(!cmp.is_valid_key(b"abcd"));
        assert!(cmp.is_valid_key(b"  -1"));
        assert_eq!(cmp.compare(b"abcd", b"  -1"), Ordering::Less);
        assert_eq!(cmp.compare(b"  -1", b"abcd"), Ordering::Greater);
        assert_eq!(cmp.compare(b"abcd", b"abce"), Ordering::Less);
    }

    // ----------------------------------------------------------------
    // String keys
    // ----------------------------------------------------------------

    #[test]
    fn string_keys_compare_bytewise() {
        let cmp = KeyComparator::new(0, KEY_LEN, AttrType::String, SortOrder::Ascending);
        let a = str_record("a", "");
        let b = str_record("b", "");
        let ab = str_record("ab", "");
        let upper = str_record("B", "");

        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare(&a, &ab), Ordering::Less);
        assert_eq!(cmp.compare(&upper, &a), Ordering::Less);
        assert!(cmp.is_valid_key(&str_record("anything", "")));
    }

    #[test]
    fn descending_reverses_string_order() {
        let cmp = KeyComparator::new(0, KEY_LEN, AttrType::String, SortOrder::Descending);
        assert_eq!(
            cmp.compare(&str_record("a", ""), &str_record("b", "")),
            Ordering::Greater
        );
    }

    // ----------------------------------------------------------------
    // Key window
    // ----------------------------------------------------------------

    /// Only the key window is compared; bytes outside it are ignored.
    #[test]
    fn compares_only_the_key_window() {
        let cmp = KeyComparator::new(KEY_LEN, PAYLOAD_LEN, AttrType::String, SortOrder::Ascending);
        let a = str_record("zzz", "aaa");
        let b = str_record("aaa", "bbb");

        assert_eq!(cmp.key(&a), &a[KEY_LEN..]);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(
            cmp.compare(&str_record("x", "same"), &str_record("y", "same")),
            Ordering::Equal
        );
    }
}
