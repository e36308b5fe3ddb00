#![no_main]
use libfuzzer_sys::fuzz_target;
use xmlaxon::Document;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Navigating a partly read document should never panic
        let mut doc = Document::parse_str(s);
        if let Ok(Some(element)) = doc.document_element(false) {
            if let Ok(Some(child)) = doc.first_child(element) {
                let _ = doc.next_sibling(child);
            }
        }
        let root = doc.root();
        let _ = doc.build(root);
    }
});
