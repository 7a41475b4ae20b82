//! Benchmarks pour le parsing GMI, SOSI et KOF sur des fichiers synthétiques

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn synthetic_gmi(lines: usize) -> String {
    let mut text = String::from(
        "GMIFILE_ASCII\n[HEADER]\nEPSG=25833\n[LINE_FIELDS]\nFieldNames=Id;FCODE;DIM;MATERIAL\n[LINES]\n",
    );
    for i in 0..lines {
        text.push_str(&format!("#OBJ {}\nValues={};SP;200;PVC\nCoords\n", i, i));
        for v in 0..5 {
            text.push_str(&format!(
                "{:.2} {:.2} {:.2}\n",
                598000.0 + (i * 10 + v) as f64,
                6640000.0 + v as f64,
                100.0 - v as f64 * 0.1
            ));
        }
        text.push('\n');
    }
    text
}

fn synthetic_sosi(curves: usize) -> String {
    let mut text =
        String::from(".HODE\n..TEGNSETT UTF-8\n..TRANSPAR\n...KOORDSYS 23\n...ENHET 0.01\n");
    for i in 0..curves {
        text.push_str(&format!(".KURVE {}:\n..OBJTYPE Spillvannsledning\n..NØH\n", i + 1));
        for v in 0..5 {
            text.push_str(&format!(
                "{} {} {}\n",
                664_000_000 + v * 100,
                59_800_000 + i * 1000 + v * 100,
                10_000 - v * 10
            ));
        }
    }
    text.push_str(".SLUTT\n");
    text
}

fn synthetic_kof(points: usize) -> String {
    let mut text = String::from(" 00 Oppdrag 01012024 1 0301 23\n");
    for i in 0..points {
        text.push_str(&format!(
            " 05 {} KUM {:.3} {:.3} {:.3}\n",
            i,
            6640000.0 + i as f64 * 0.5,
            598000.0 + i as f64,
            100.0 + (i % 10) as f64 * 0.01
        ));
    }
    text
}

fn bench_formats(c: &mut Criterion) {
    let inputs = [
        ("ledninger.gmi", synthetic_gmi(2_000)),
        ("ledninger.sos", synthetic_sosi(2_000)),
        ("punkter.kof", synthetic_kof(10_000)),
    ];

    let mut group = c.benchmark_group("parse_bytes");
    for (name, text) in &inputs {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            b.iter(|| {
                let result = vadata::parse_bytes(name, black_box(text.as_bytes()));
                black_box(result.feature_count())
            })
        });
    }
    group.finish();
}

fn bench_detect(c: &mut Criterion) {
    let text = synthetic_kof(100);
    c.bench_function("detect_format_sniff", |b| {
        b.iter(|| vadata::detect_format(black_box("export.txt"), black_box(text.as_bytes())))
    });
}

criterion_group!(benches, bench_formats, bench_detect);
criterion_main!(benches);
