use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reclink::{Column, Table, UidPair};

const SURNAMES: &[&str] = &[
    "anderson",
    "martinez",
    "rodriguez",
    "petersen",
    "lindqvist",
    "fernandez",
    "takahashi",
    "kowalski",
    "abernathy",
    "gallagher",
    "whitfield",
    "oberlander",
];

const CITIES: &[&str] = &["oslo", "rome", "bern", "kyiv"];

/// Drop one character from the middle of a value, the way a data-entry typo
/// would. Stays within 0.85 normalized levenshtein of the original for the
/// surnames above.
#[allow(dead_code)]
pub fn with_typo(value: &str) -> String {
    let mid = value.len() / 2;
    format!("{}{}", &value[..mid], &value[mid + 1..])
}

/// A seeded person table where every base record is followed by a
/// near-duplicate of itself, plus the ground-truth pairs linking them.
///
/// Uids are assigned sequentially: base record i gets `2i + 1`, its
/// duplicate `2i + 2`.
#[allow(dead_code)]
pub fn person_fixture(seed: u64, base_count: usize) -> (Table, Vec<UidPair>) {
    assert!(base_count <= SURNAMES.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut surnames: Vec<&str> = SURNAMES.to_vec();
    surnames.shuffle(&mut rng);

    let mut ids: Vec<String> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut cities: Vec<Option<&str>> = Vec::new();
    let mut ages: Vec<Option<f64>> = Vec::new();
    let mut gold = Vec::new();

    for (i, surname) in surnames.iter().take(base_count).enumerate() {
        let city = CITIES[rng.random_range(0..CITIES.len())];
        let age = rng.random_range(18..90) as f64;
        let base_uid = (2 * i + 1).to_string();
        let dup_uid = (2 * i + 2).to_string();

        ids.push(base_uid.clone());
        names.push((*surname).to_string());
        cities.push(Some(city));
        ages.push(Some(age));

        ids.push(dup_uid.clone());
        names.push(with_typo(surname));
        cities.push(Some(city));
        ages.push(Some(age));

        gold.push(UidPair::new(base_uid.as_str(), dup_uid.as_str()));
    }

    let id_refs: Vec<Option<&str>> = ids.iter().map(|s| Some(s.as_str())).collect();
    let name_refs: Vec<Option<&str>> = names.iter().map(|s| Some(s.as_str())).collect();
    let table = Table::new(
        "people",
        vec![
            Column::text("id", &id_refs),
            Column::text("surname", &name_refs),
            Column::text("city", &cities),
            Column::numeric("age", &ages),
        ],
    )
    .expect("fixture columns are aligned");

    (table, gold)
}

/// Two-table variant: base records in the left table, their near-duplicates
/// in the right table, with ground truth ordered left-to-right.
#[allow(dead_code)]
pub fn linked_pair_fixture(seed: u64, base_count: usize) -> (Table, Table, Vec<UidPair>) {
    assert!(base_count <= SURNAMES.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut surnames: Vec<&str> = SURNAMES.to_vec();
    surnames.shuffle(&mut rng);

    let mut left_ids: Vec<String> = Vec::new();
    let mut left_names: Vec<String> = Vec::new();
    let mut right_ids: Vec<String> = Vec::new();
    let mut right_names: Vec<String> = Vec::new();
    let mut cities: Vec<Option<&str>> = Vec::new();
    let mut ages: Vec<Option<f64>> = Vec::new();
    let mut gold = Vec::new();

    for (i, surname) in surnames.iter().take(base_count).enumerate() {
        let city = CITIES[rng.random_range(0..CITIES.len())];
        let age = rng.random_range(18..90) as f64;
        let left_uid = format!("l{i}");
        let right_uid = format!("r{i}");

        left_ids.push(left_uid.clone());
        left_names.push((*surname).to_string());
        right_ids.push(right_uid.clone());
        right_names.push(with_typo(surname));
        cities.push(Some(city));
        ages.push(Some(age));

        gold.push(UidPair::new(left_uid.as_str(), right_uid.as_str()));
    }

    let left_id_refs: Vec<Option<&str>> = left_ids.iter().map(|s| Some(s.as_str())).collect();
    let left_name_refs: Vec<Option<&str>> = left_names.iter().map(|s| Some(s.as_str())).collect();
    let right_id_refs: Vec<Option<&str>> = right_ids.iter().map(|s| Some(s.as_str())).collect();
    let right_name_refs: Vec<Option<&str>> =
        right_names.iter().map(|s| Some(s.as_str())).collect();

    let left = Table::new(
        "people_a",
        vec![
            Column::text("id", &left_id_refs),
            Column::text("surname", &left_name_refs),
            Column::text("city", &cities),
            Column::numeric("age", &ages),
        ],
    )
    .expect("fixture columns are aligned");
    let right = Table::new(
        "people_b",
        vec![
            Column::text("id", &right_id_refs),
            Column::text("surname", &right_name_refs),
            Column::text("city", &cities),
            Column::numeric("age", &ages),
        ],
    )
    .expect("fixture columns are aligned");

    (left, right, gold)
}
