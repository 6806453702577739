use crate::{Record, PROCESSED};

fn clean(field: &str) -> String {
    let field = field.trim();
    if field.eq_ignore_ascii_case("N/A") || field.eq_ignore_ascii_case("NA") {
        String::new()
    } else {
        field.to_string()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn school_email(raw: &str) -> String {
    raw.replacen("g.hmc.edu", "hmc.edu", 1)
}

fn or_raw(record: &Record, derived: &str, raw: &str) -> String {
    let current = record.cell(derived);
    if current.is_empty() {
        record.cell(raw)
    } else {
        current
    }
}

pub(crate) fn prefill_pending(record: &mut Record) {
    if record.is_processed() {
        return;
    }
    record.set(PROCESSED, "");

    for raw in ["rawCityState", "rawSummerCityState"] {
        let cleaned = clean(&record.cell(raw));
        record.set(raw, cleaned);
    }

    if record.cell("email").is_empty() {
        let email = school_email(&record.cell("rawEmail"));
        record.set("email", email);
    }

    let name = clean(&or_raw(record, "name", "rawName"));
    record.set("name", name);

    if record.cell("major").is_empty() {
        let major = record
            .cell("rawMajor")
            .split(", ")
            .map(|m| capitalize(&clean(m)))
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join(" + ");
        record.set("major", major);
    }

    let path = clean(&or_raw(record, "path", "rawPath"));
    record.set("path", path);

    let mut org = capitalize(&clean(&or_raw(record, "org", "rawOrg")));
    if org.eq_ignore_ascii_case("FB") {
        org = "Facebook".to_string();
    }
    record.set("org", org);

    for (derived, raw) in [
        ("summerPlans", "rawSummerPlans"),
        ("summerOrg", "rawSummerOrg"),
        ("comments", "rawComments"),
        ("phoneNumber", "rawPhoneNumber"),
    ] {
        let value = clean(&or_raw(record, derived, raw));
        record.set(derived, value);
    }

    let post_grad = record.cell("postGradEmail");
    let post_grad = if post_grad.is_empty() {
        school_email(&record.cell("rawPostGradEmail"))
    } else {
        post_grad
    };
    record.set("postGradEmail", clean(&post_grad));
}
