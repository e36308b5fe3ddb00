#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use xmlaxon::event::NullHandler;
use xmlaxon::serial::SerializerOptions;
use xmlaxon::Document;

// ---------------------------------------------------------------------------
// Document generators
// ---------------------------------------------------------------------------

/// Generates a small XML document with approximately 10 elements.
fn make_small_xml() -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root>\n");
    for i in 0..10 {
        let _ = writeln!(xml, "  <item id=\"{i}\">Value {i}</item>");
    }
    xml.push_str("</root>\n");
    xml
}

/// Generates a large XML document with approximately 1000 records.
fn make_large_xml() -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<database>\n");
    for i in 0..1000 {
        let _ = writeln!(
            xml,
            "  <record id=\"{i}\"><name>Record {i}</name>\
             <value>{}</value><status>active</status></record>",
            i * 42
        );
    }
    xml.push_str("</database>\n");
    xml
}

/// Generates an envelope with a small header and a large body, the shape
/// where reading only the header pays off.
fn make_envelope_xml() -> String {
    let mut xml = String::from(
        "<env:Envelope xmlns:env=\"urn:env\">\
         <env:Header><id>42</id><to>service</to></env:Header><env:Body>",
    );
    for i in 0..1000 {
        let _ = write!(xml, "<entry n=\"{i}\">payload {i}</entry>");
    }
    xml.push_str("</env:Body></env:Envelope>");
    xml
}

// ---------------------------------------------------------------------------
// Building benchmarks
// ---------------------------------------------------------------------------

fn bench_build_small(c: &mut Criterion) {
    let xml = make_small_xml();
    c.bench_function("build_small", |b| {
        b.iter(|| {
            let mut doc = Document::parse_str(black_box(&xml));
            let root = doc.root();
            doc.build(root).unwrap();
            doc
        });
    });
}

fn bench_build_large(c: &mut Criterion) {
    let xml = make_large_xml();
    c.bench_function("build_large", |b| {
        b.iter(|| {
            let mut doc = Document::parse_str(black_box(&xml));
            let root = doc.root();
            doc.build(root).unwrap();
            doc
        });
    });
}

fn bench_header_only(c: &mut Criterion) {
    let xml = make_envelope_xml();
    c.bench_function("header_only", |b| {
        b.iter(|| {
            let mut doc = Document::parse_str(black_box(&xml));
            let envelope = doc.document_element(false).unwrap().unwrap();
            let header = doc.first_child_element(envelope).unwrap().unwrap();
            doc.text_content(header).unwrap()
        });
    });
}

// ---------------------------------------------------------------------------
// Serialization benchmarks
// ---------------------------------------------------------------------------

fn bench_serialize_cached(c: &mut Criterion) {
    let xml = make_large_xml();
    c.bench_function("serialize_cached", |b| {
        b.iter(|| {
            let mut doc = Document::parse_str(black_box(&xml));
            let root = doc.root();
            let mut serializer = doc.pull_serializer(root, SerializerOptions::default()).unwrap();
            serializer.pump_to(&mut NullHandler).unwrap();
        });
    });
}

fn bench_serialize_pull_through(c: &mut Criterion) {
    let xml = make_large_xml();
    c.bench_function("serialize_pull_through", |b| {
        b.iter(|| {
            let mut doc = Document::parse_str(black_box(&xml));
            let root = doc.root();
            let options = SerializerOptions::default().cache(false);
            let mut serializer = doc.pull_serializer(root, options).unwrap();
            serializer.pump_to(&mut NullHandler).unwrap();
        });
    });
}

fn bench_write_xml(c: &mut Criterion) {
    let xml = make_small_xml();
    c.bench_function("write_xml_small", |b| {
        b.iter(|| {
            let mut doc = Document::parse_str(black_box(&xml));
            let root = doc.root();
            doc.write_xml(root, SerializerOptions::default().cache(false)).unwrap()
        });
    });
}

criterion_group!(building, bench_build_small, bench_build_large, bench_header_only);

criterion_group!(
    serialization,
    bench_serialize_cached,
    bench_serialize_pull_through,
    bench_write_xml
);

criterion_main!(building, serialization);
