use std::str::FromStr;

use chrono::TimeZone;
use rust_decimal::Decimal;
use wscat_core::{RawStock, SourceTag};

use super::*;

fn observed() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn record(sku: &str, name: &str, flavour: Option<&str>, images: &[&str]) -> CanonicalProduct {
    CanonicalProduct {
        source: SourceTag::Csv,
        source_id: format!("drop.csv:{sku}"),
        sku: sku.to_owned(),
        name: name.to_owned(),
        brand: "Acme".to_owned(),
        price: Decimal::from_str("29.99").unwrap(),
        raw_stock: RawStock::Quantity(5),
        in_stock: true,
        category: "Protein".to_owned(),
        image_urls: images.iter().map(|s| (*s).to_owned()).collect(),
        flavour: flavour.map(str::to_owned),
        description: None,
        tags: Vec::new(),
        parent_sku: None,
        source_updated_at: None,
    }
}

fn acme_whey_batch() -> Vec<CanonicalProduct> {
    vec![
        record("WHEY-VAN-900", "Acme Whey 900g Vanilla", Some("Vanilla"), &["https://img/van.jpg"]),
        record(
            "WHEY-CHOC-900",
            "Acme Whey 900g Chocolate",
            Some("Chocolate"),
            &["https://img/choc.jpg"],
        ),
        record(
            "WHEY-STR-2K",
            "Acme Whey 2kg Strawberry",
            Some("Strawberry"),
            &["https://img/str.jpg"],
        ),
    ]
}

// -----------------------------------------------------------------------
// flavour merge
// -----------------------------------------------------------------------

#[test]
fn acme_whey_flavours_merge_into_one_product() {
    let report = merge_batch(acme_whey_batch(), &MergePolicy::default(), observed());

    assert_eq!(report.products.len(), 1);
    assert_eq!(report.merged_groups, 1);
    let product = &report.products[0];
    assert_eq!(product.flavours, vec!["Vanilla", "Chocolate", "Strawberry"]);
    assert_eq!(
        product.images,
        vec!["https://img/van.jpg", "https://img/choc.jpg", "https://img/str.jpg"]
    );
    assert_eq!(product.name, "Acme Whey 900g");
    assert_eq!(product.family_key, "acme whey");
    assert_eq!(
        product.member_skus,
        vec!["WHEY-VAN-900", "WHEY-CHOC-900", "WHEY-STR-2K"]
    );
    assert_eq!(product.flavour_images.len(), 3);
    assert_eq!(product.flavour_images["chocolate"], "https://img/choc.jpg");
    for key in product.flavour_images.keys() {
        assert!(product.flavours.iter().any(|f| f.to_lowercase() == *key));
    }
}

#[test]
fn flavour_detection_is_order_insensitive() {
    let forward = merge_batch(acme_whey_batch(), &MergePolicy::default(), observed());
    let mut reversed_input = acme_whey_batch();
    reversed_input.reverse();
    let reversed = merge_batch(reversed_input, &MergePolicy::default(), observed());

    assert_eq!(forward.products.len(), 1);
    assert_eq!(reversed.products.len(), 1);
    assert_eq!(forward.products[0].id, reversed.products[0].id);
    let mut a = forward.products[0].flavours.clone();
    let mut b = reversed.products[0].flavours.clone();
    a.sort();
    b.sort();
    assert_eq!(a, b);
}

#[test]
fn merged_id_prefers_parent_sku() {
    let mut batch = acme_whey_batch();
    batch[1].parent_sku = Some("ACME-WHEY".to_owned());
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert_eq!(report.products[0].id, "ACME-WHEY");
}

#[test]
fn merged_id_is_synthesized_and_stable_without_parent_sku() {
    let first = merge_batch(acme_whey_batch(), &MergePolicy::default(), observed());
    let second = merge_batch(acme_whey_batch(), &MergePolicy::default(), observed());
    let id = &first.products[0].id;
    assert!(id.starts_with("fam-"));
    assert_eq!(id.len(), 4 + 12);
    assert_eq!(id, &second.products[0].id);
}

#[test]
fn flavour_case_differences_do_not_count_as_distinct() {
    let batch = vec![
        record("A", "Acme Whey 900g Vanilla", Some("Vanilla"), &["https://img/a.jpg"]),
        record("B", "Acme Whey 2kg vanilla", Some(" vanilla "), &["https://img/b.jpg"]),
    ];
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert_eq!(report.products.len(), 2);
    assert_eq!(report.merged_groups, 0);
}

#[test]
fn merged_product_is_in_stock_if_any_member_is() {
    let mut batch = acme_whey_batch();
    batch[0].in_stock = false;
    batch[2].in_stock = false;
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert!(report.products[0].in_stock);

    let mut batch = acme_whey_batch();
    for r in &mut batch {
        r.in_stock = false;
    }
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert!(!report.products[0].in_stock);
}

#[test]
fn flavour_images_empty_when_all_share_one_image() {
    let batch = vec![
        record("A", "Acme Whey Vanilla", Some("Vanilla"), &["https://img/tub.jpg"]),
        record("B", "Acme Whey Chocolate", Some("Chocolate"), &["https://img/tub.jpg"]),
    ];
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert_eq!(report.products.len(), 1);
    assert!(report.products[0].flavour_images.is_empty());
    assert_eq!(report.products[0].images, vec!["https://img/tub.jpg"]);
}

#[test]
fn member_without_image_still_merges() {
    let batch = vec![
        record("A", "Acme Whey Vanilla", Some("Vanilla"), &["https://img/van.jpg"]),
        record("B", "Acme Whey Chocolate", Some("Chocolate"), &[]),
    ];
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert_eq!(report.products.len(), 1);
    assert_eq!(report.products[0].member_skus, vec!["A", "B"]);
    assert!(report.products[0].flavour_images.is_empty());
}

#[test]
fn group_without_any_image_is_dropped() {
    let batch = vec![
        record("A", "Acme Whey Vanilla", Some("Vanilla"), &[]),
        record("B", "Acme Whey Chocolate", Some("Chocolate"), &[]),
        record("C", "Acme Creatine", None, &["https://img/creatine.jpg"]),
    ];
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert_eq!(report.dropped_groups, 1);
    assert_eq!(report.products.len(), 1);
    assert_eq!(report.products[0].id, "C");
}

// -----------------------------------------------------------------------
// no merge
// -----------------------------------------------------------------------

#[test]
fn identical_flavours_stay_separate() {
    let batch = vec![
        record("A", "Acme Whey 900g Vanilla", Some("Vanilla"), &["https://img/a.jpg"]),
        record("B", "Acme Whey 2kg Vanilla", Some("Vanilla"), &["https://img/b.jpg"]),
    ];
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    let ids: Vec<_> = report.products.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);
    assert!(report.products.iter().all(|p| p.flavours == ["Vanilla"]));
}

#[test]
fn absent_flavours_stay_separate() {
    let batch = vec![
        record("A", "Acme Whey 900g", None, &["https://img/a.jpg"]),
        record("B", "Acme Whey 2kg", None, &["https://img/b.jpg"]),
    ];
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert_eq!(report.products.len(), 2);
}

#[test]
fn single_record_passes_through() {
    let batch = vec![record("A", "Acme Creatine 300g", None, &["https://img/c.jpg"])];
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    let product = &report.products[0];
    assert_eq!(product.id, "A");
    assert_eq!(product.name, "Acme Creatine 300g");
    assert_eq!(product.member_skus, vec!["A"]);
    assert!(product.flavours.is_empty());
    assert_eq!(product.created_at, observed());
}

#[test]
fn different_brands_never_group() {
    let mut other = record("B", "Acme Whey 900g Chocolate", Some("Chocolate"), &["https://img/b.jpg"]);
    other.brand = "Zenith".to_owned();
    let batch = vec![
        record("A", "Acme Whey 900g Vanilla", Some("Vanilla"), &["https://img/a.jpg"]),
        other,
    ];
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert_eq!(report.products.len(), 2);
}

// -----------------------------------------------------------------------
// exclusion and duplicates
// -----------------------------------------------------------------------

#[test]
fn exclusion_policy_drops_records_before_grouping() {
    let policy = MergePolicy {
        excluded_categories: vec!["samples".to_owned()],
        excluded_tags: vec!["wholesale-only".to_owned()],
        excluded_name_keywords: vec!["tester".to_owned()],
    };
    let mut sample = record("S", "Acme Sachet", None, &["https://img/s.jpg"]);
    sample.category = "Samples".to_owned();
    let mut tagged = record("T", "Acme Shaker", None, &["https://img/t.jpg"]);
    tagged.tags = vec!["Wholesale-Only".to_owned()];
    let named = record("N", "Acme Whey TESTER", None, &["https://img/n.jpg"]);
    let kept = record("K", "Acme Creatine", None, &["https://img/k.jpg"]);

    let report = merge_batch(vec![sample, tagged, named, kept], &policy, observed());
    assert_eq!(report.excluded, 3);
    assert_eq!(report.products.len(), 1);
    assert_eq!(report.products[0].id, "K");
}

#[test]
fn duplicate_sku_keeps_the_later_record() {
    let mut later = record("A", "Acme Creatine", None, &["https://img/new.jpg"]);
    later.price = Decimal::from_str("24.99").unwrap();
    let batch = vec![
        record("A", "Acme Creatine", None, &["https://img/old.jpg"]),
        later,
    ];
    let report = merge_batch(batch, &MergePolicy::default(), observed());
    assert_eq!(report.products.len(), 1);
    assert_eq!(report.duplicate_ids, 1);
    assert_eq!(report.products[0].price, Decimal::from_str("24.99").unwrap());
    assert_eq!(report.skipped(), 1);
}

#[test]
fn strip_flavour_removes_words_case_insensitively() {
    assert_eq!(strip_flavour("Acme Whey Cookies & Cream", Some("cookies & cream")), "Acme Whey");
    assert_eq!(strip_flavour("Vanilla", Some("Vanilla")), "Vanilla");
    assert_eq!(strip_flavour("Acme Whey", None), "Acme Whey");
}
