use chrono::{Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use release_notifier::models::{parse_release_date, Artist, DatePrecision, Release};
use release_notifier::services::select_new;
use std::hint::black_box;

/// A large discography: one release every three days going back ~40 years.
fn discography(now: chrono::DateTime<Utc>) -> Vec<Release> {
    (0..5000)
        .map(|i| Release {
            id: format!("album-{}", i),
            name: format!("Album {}", i),
            album_type: "album".to_string(),
            album_group: Some("album".to_string()),
            url: format!("https://open.spotify.com/album/album-{}", i),
            uri: format!("spotify:album:album-{}", i),
            image_url: None,
            release_date: now - Duration::days(i * 3),
            precision: DatePrecision::Day,
            artists: vec![Artist {
                id: "artist".to_string(),
                name: "Artist".to_string(),
            }],
        })
        .collect()
}

fn benchmark_release_window(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let releases = discography(now);

    let mut group = c.benchmark_group("release_window");

    group.bench_function("select_new_last_week", |b| {
        b.iter_batched(
            || releases.clone(),
            |releases| select_new(releases, black_box(now - Duration::days(7)), black_box(now)),
            BatchSize::SmallInput,
        )
    });

    group.bench_function("parse_release_date_mixed", |b| {
        b.iter(|| {
            parse_release_date(black_box("2024-06-14"), DatePrecision::Day).ok();
            parse_release_date(black_box("2024-06"), DatePrecision::Month).ok();
            parse_release_date(black_box("2024"), DatePrecision::Year).ok();
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_release_window);
criterion_main!(benches);
