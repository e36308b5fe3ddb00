#![no_main]
use libfuzzer_sys::fuzz_target;
use xmlaxon::serial::SerializerOptions;
use xmlaxon::Document;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Lazy and eager serialization must agree whenever both succeed
        let mut lazy = Document::parse_str(s);
        let root = lazy.root();
        let lazy_out = lazy.write_xml(root, SerializerOptions::default().cache(false));

        let mut eager = Document::parse_str(s);
        let root = eager.root();
        if eager.build(root).is_ok() {
            let eager_out = eager.write_xml(root, SerializerOptions::default());
            if let (Ok(a), Ok(b)) = (lazy_out, eager_out) {
                assert_eq!(a, b);
            }
        }
    }
});
