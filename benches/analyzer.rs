use std::hint::black_box;
use std::path::PathBuf;

use criterion::{Criterion, criterion_group, criterion_main};

use rom_dedupe::analyzer::{FileEntry, analyze};
use rom_dedupe::resolve::{ResolutionPolicy, group_and_resolve};

const FILENAMES: &[&str] = &[
    "Super Mario Bros. (USA).nes",
    "Super Mario Bros. (Japan, USA) (Rev 1).nes",
    "Final Fantasy VII (Europe) (Disc 2).bin",
    "Biohazard 2 - Value Plus (Japan) [b].iso",
    "Street Fighter Zero 3 (J) [!].sfc",
    "The Legend of Zelda - A Link to the Past (U) (V1.1).smc",
    "Tetris.gb",
];

fn bench_analyze(c: &mut Criterion) {
    c.bench_function("analyze", |b| {
        b.iter(|| {
            for filename in FILENAMES {
                black_box(analyze(black_box(filename)));
            }
        });
    });
}

fn bench_group_and_resolve(c: &mut Criterion) {
    let regions = ["USA", "Europe", "Japan", "World"];
    let entries: Vec<FileEntry> = (0..1000)
        .map(|i| {
            let filename = format!("Game {} ({}).nes", i / 4, regions[i % regions.len()]);
            FileEntry::new(PathBuf::from("/roms").join(&filename), &filename)
        })
        .collect();
    let policy = ResolutionPolicy::default();

    c.bench_function("group_and_resolve", |b| {
        b.iter(|| black_box(group_and_resolve(black_box(entries.clone()), &policy)));
    });
}

criterion_group!(benches, bench_analyze, bench_group_and_resolve);
criterion_main!(benches);
