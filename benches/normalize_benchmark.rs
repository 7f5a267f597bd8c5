use criterion::{criterion_group, criterion_main, Criterion};
use review_desk::services::normalize::{page_from_v4, rating_from_json, v4};
use std::hint::black_box;

const LOCATION: &str = "accounts/111/locations/222";

/// A realistic full page: mixed ratings, some anonymous reviewers, some replies.
fn sample_page() -> v4::ListReviewsResponse {
    let stars = ["ONE", "TWO", "THREE", "FOUR", "FIVE", "STAR_RATING_UNSPECIFIED"];
    let reviews = (0..50)
        .map(|i| v4::Review {
            name: Some(format!("{}/reviews/id-{}", LOCATION, i)),
            review_id: (i % 7 != 0).then(|| format!("id-{}", i)),
            reviewer: v4::Reviewer {
                display_name: Some(format!("Reviewer {}", i)),
                is_anonymous: i % 11 == 0,
            },
            star_rating: Some(serde_json::Value::String(stars[i % stars.len()].to_string())),
            comment: Some("Service impeccable, on reviendra avec plaisir. ".repeat(1 + i % 4)),
            create_time: Some(format!("2026-03-{:02}T10:00:00Z", 1 + i % 28)),
            update_time: None,
            review_reply: (i % 3 == 0).then(|| v4::ReviewReply {
                comment: "Merci beaucoup!".to_string(),
                update_time: Some("2026-04-01T08:00:00.123Z".to_string()),
            }),
        })
        .collect();

    v4::ListReviewsResponse {
        reviews,
        next_page_token: Some("next".to_string()),
        average_rating: Some(4.2),
        total_review_count: Some(500),
    }
}

fn benchmark_normalize_page(c: &mut Criterion) {
    let response = sample_page();

    c.bench_function("normalize_v4_page", |b| {
        b.iter(|| {
            let page = page_from_v4(black_box(response.clone()));
            page.reviews
                .iter()
                .map(|r| r.normalize(LOCATION))
                .collect::<Vec<_>>()
        })
    });
}

fn benchmark_rating_mapping(c: &mut Criterion) {
    let inputs: Vec<serde_json::Value> = vec![
        serde_json::json!("FIVE"),
        serde_json::json!("ONE"),
        serde_json::json!("STAR_RATING_UNSPECIFIED"),
        serde_json::json!(4),
        serde_json::json!(4.5),
        serde_json::json!(null),
    ];

    c.bench_function("rating_from_json", |b| {
        b.iter(|| {
            inputs
                .iter()
                .map(|v| rating_from_json(black_box(v)) as u32)
                .sum::<u32>()
        })
    });
}

criterion_group!(benches, benchmark_normalize_page, benchmark_rating_mapping);
criterion_main!(benches);
