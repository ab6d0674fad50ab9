//! Per-row validation (§4.2 "Per-row validation (common)"). Field-level
//! checks are pure functions; foreign-key and duplicate-key checks are
//! layered on top by `pipeline.rs` since they need access to Storage and to
//! the in-batch hash set respectively.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::tsv::RawRow;
use crate::entities::{Sku, Store, Style};

fn required(fields: &RawRow, name: &str) -> Result<String, String> {
    match fields.get(name) {
        Some(v) if !v.is_empty() => Ok(v.clone()),
        _ => Err(format!("empty:{name}")),
    }
}

fn bounded(fields: &RawRow, name: &str, min: usize, max: usize) -> Result<String, String> {
    let value = required(fields, name)?;
    if value.chars().count() < min || value.chars().count() > max {
        return Err(format!("length:{name}"));
    }
    Ok(value)
}

fn decimal(fields: &RawRow, name: &str) -> Result<Decimal, String> {
    let raw = required(fields, name)?;
    Decimal::from_str(&raw).map_err(|_| format!("number:{name}"))
}

fn non_negative_decimal(fields: &RawRow, name: &str) -> Result<Decimal, String> {
    let value = decimal(fields, name)?;
    if value.is_sign_negative() {
        return Err(format!("number:{name}"));
    }
    Ok(value)
}

fn positive_decimal(fields: &RawRow, name: &str) -> Result<Decimal, String> {
    let value = decimal(fields, name)?;
    if value.is_sign_negative() || value.is_zero() {
        return Err(format!("number:{name}"));
    }
    Ok(value)
}

fn positive_integer(fields: &RawRow, name: &str) -> Result<i64, String> {
    let raw = required(fields, name)?;
    let value = raw.parse::<i64>().map_err(|_| format!("number:{name}"))?;
    if value <= 0 {
        return Err(format!("number:{name}"));
    }
    Ok(value)
}

fn strict_date(fields: &RawRow, name: &str) -> Result<NaiveDate, String> {
    let raw = required(fields, name)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| format!("date:{name}"))
}

/// Upper-cases a field after required/length validation, matching §3's "...
/// branch/category/code fields are upper-cased" rule and the normalization
/// table in §4.2.1.
fn upper(value: String) -> String {
    value.to_uppercase()
}

pub fn validate_style(fields: &RawRow, now: chrono::DateTime<chrono::Utc>) -> Result<Style, String> {
    let style = upper(bounded(fields, "style", 1, 50)?);
    let brand = upper(bounded(fields, "brand", 1, 50)?);
    let category = upper(bounded(fields, "category", 1, 50)?);
    let sub_category = upper(bounded(fields, "sub_category", 1, 50)?);
    let mrp = positive_decimal(fields, "mrp")?;
    let gender = upper(bounded(fields, "gender", 1, 10)?);
    Ok(Style {
        style,
        brand,
        category,
        sub_category,
        mrp,
        gender,
        created_at: now,
        updated_at: now,
    })
}

pub fn validate_store(fields: &RawRow, now: chrono::DateTime<chrono::Utc>) -> Result<Store, String> {
    let branch = upper(bounded(fields, "branch", 1, 50)?);
    let city = upper(bounded(fields, "city", 1, 50)?);
    Ok(Store {
        branch,
        city,
        created_at: now,
        updated_at: now,
    })
}

/// Returns the parsed row without the Style foreign-key check, which the
/// pipeline performs against Storage (possibly against rows inserted
/// earlier in this same batch).
pub fn validate_sku(fields: &RawRow, now: chrono::DateTime<chrono::Utc>) -> Result<Sku, String> {
    let sku = upper(bounded(fields, "sku", 1, 50)?);
    let style = upper(bounded(fields, "style", 1, 50)?);
    let size = upper(bounded(fields, "size", 1, 10)?);
    Ok(Sku {
        sku,
        style,
        size,
        created_at: now,
        updated_at: now,
    })
}

/// A validated Sales row prior to the FK checks the pipeline performs
/// (SKU/Store existence, §4.2 "Per-file semantics").
pub struct ValidatedSalesFields {
    pub day: NaiveDate,
    pub sku: String,
    pub channel: String,
    pub quantity: i64,
    pub discount: Decimal,
    pub revenue: Decimal,
}

pub fn validate_sales(fields: &RawRow) -> Result<ValidatedSalesFields, String> {
    let day = strict_date(fields, "day")?;
    let sku = upper(required(fields, "sku")?);
    let channel = upper(required(fields, "channel")?);
    let quantity = positive_integer(fields, "quantity")?;
    let discount = non_negative_decimal(fields, "discount")?;
    let revenue = non_negative_decimal(fields, "revenue")?;
    Ok(ValidatedSalesFields {
        day,
        sku,
        channel,
        quantity,
        discount,
        revenue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    #[test]
    fn valid_style_row_parses_and_uppercases() {
        let fields: RawRow = hashmap! {
            "style".into() => "shirt001".into(),
            "brand".into() => "nike".into(),
            "category".into() => "shirts".into(),
            "sub_category".into() => "casual".into(),
            "mrp".into() => "100.50".into(),
            "gender".into() => "m".into(),
        };
        let style = validate_style(&fields, chrono::Utc::now()).unwrap();
        assert_eq!(style.style, "SHIRT001");
        assert_eq!(style.gender, "M");
    }

    #[test]
    fn empty_required_field_is_rejected() {
        let fields: RawRow = hashmap! {
            "style".into() => String::new(),
            "brand".into() => "nike".into(),
            "category".into() => "shirts".into(),
            "sub_category".into() => "casual".into(),
            "mrp".into() => "100.50".into(),
            "gender".into() => "m".into(),
        };
        assert_eq!(validate_style(&fields, chrono::Utc::now()), Err("empty:style".into()));
    }

    #[test]
    fn non_positive_mrp_is_rejected() {
        let fields: RawRow = hashmap! {
            "style".into() => "S1".into(),
            "brand".into() => "nike".into(),
            "category".into() => "shirts".into(),
            "sub_category".into() => "casual".into(),
            "mrp".into() => "0".into(),
            "gender".into() => "m".into(),
        };
        assert_eq!(validate_style(&fields, chrono::Utc::now()), Err("number:mrp".into()));
    }

    #[test]
    fn sales_strict_date_parsing() {
        let fields: RawRow = hashmap! {
            "day".into() => "2024-01-15".into(),
            "sku".into() => "sku001".into(),
            "channel".into() => "mumbai_central".into(),
            "quantity".into() => "5".into(),
            "discount".into() => "10.00".into(),
            "revenue".into() => "450.00".into(),
        };
        let row = validate_sales(&fields).unwrap();
        assert_eq!(row.day, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(row.sku, "SKU001");
        assert_eq!(row.channel, "MUMBAI_CENTRAL");
    }

    #[test]
    fn sales_bad_date_format_is_rejected() {
        let fields: RawRow = hashmap! {
            "day".into() => "15/01/2024".into(),
            "sku".into() => "SKU001".into(),
            "channel".into() => "MUMBAI_CENTRAL".into(),
            "quantity".into() => "5".into(),
            "discount".into() => "10.00".into(),
            "revenue".into() => "450.00".into(),
        };
        assert_eq!(validate_sales(&fields), Err("date:day".into()));
    }

    #[test]
    fn sales_negative_discount_is_rejected() {
        let fields: RawRow = hashmap! {
            "day".into() => "2024-01-15".into(),
            "sku".into() => "SKU001".into(),
            "channel".into() => "MUMBAI_CENTRAL".into(),
            "quantity".into() => "5".into(),
            "discount".into() => "-1.00".into(),
            "revenue".into() => "450.00".into(),
        };
        assert_eq!(validate_sales(&fields), Err("number:discount".into()));
    }
}
