// Fuzz target exploring document path and collection pattern parsing.
#![no_main]

use libfuzzer_sys::fuzz_target;
use rideshear_rules::{CollectionPattern, DocumentPath};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let (left, right) = text.split_once('\n').unwrap_or((text, text));
    let document = DocumentPath::parse(left);
    let pattern = CollectionPattern::parse(right);

    if let Ok(document) = &document {
        assert_eq!(document.segments().len() % 2, 0);
        let reparsed = DocumentPath::parse(&document.to_string()).expect("display round-trips");
        assert_eq!(&reparsed, document);
    }

    if let (Ok(document), Ok(pattern)) = (document, pattern) {
        if let Some(params) = pattern.matches(&document) {
            for name in pattern.param_names() {
                assert!(params.contains_key(name));
            }
        }
    }
});
