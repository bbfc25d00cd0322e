use super::CsvProfile;

/// Known statement exports, recognized by their header row.
/// Returns a CsvProfile if the format is recognized, None otherwise.
pub(crate) fn detect_statement_format(headers: &[String]) -> Option<CsvProfile> {
    let h: Vec<String> = headers
        .iter()
        .map(|s| s.trim_start_matches('\u{feff}').trim().to_lowercase())
        .collect();

    // Max: "שם בית העסק" + "סכום חיוב"
    if h.contains(&"שם בית העסק".into()) && h.contains(&"סכום חיוב".into()) {
        return Some(CsvProfile {
            name: "Max".into(),
            date_column: col_index(&h, "תאריך עסקה").unwrap_or(0),
            merchant_column: col_index(&h, "שם בית העסק").unwrap_or(1),
            amount_column: col_index(&h, "סכום חיוב"),
            currency_column: col_index(&h, "מטבע חיוב"),
            original_amount_column: col_index(&h, "סכום עסקה מקורי"),
            original_currency_column: col_index(&h, "מטבע עסקה מקורי"),
            card_column: col_index(&h, "4 ספרות אחרונות של כרטיס האשראי"),
            date_format: "%d-%m-%Y".into(),
            negate_amounts: true,
            ..CsvProfile::default()
        });
    }

    // Isracard: "שם בית עסק" + "סכום החיוב"
    if h.contains(&"שם בית עסק".into()) && h.contains(&"סכום החיוב".into()) {
        return Some(CsvProfile {
            name: "Isracard".into(),
            date_column: col_index(&h, "תאריך רכישה").unwrap_or(0),
            merchant_column: col_index(&h, "שם בית עסק").unwrap_or(1),
            amount_column: col_index(&h, "סכום החיוב"),
            currency_column: col_index(&h, "מטבע חיוב"),
            original_amount_column: col_index(&h, "סכום עסקה"),
            original_currency_column: col_index(&h, "מטבע מקור"),
            date_format: "%d/%m/%Y".into(),
            negate_amounts: true,
            ..CsvProfile::default()
        });
    }

    // Cal: "בית עסק" + "סכום חיוב"
    if h.contains(&"בית עסק".into()) && h.contains(&"סכום חיוב".into()) {
        return Some(CsvProfile {
            name: "Cal".into(),
            date_column: col_index(&h, "תאריך העסקה").unwrap_or(0),
            merchant_column: col_index(&h, "בית עסק").unwrap_or(1),
            amount_column: col_index(&h, "סכום חיוב"),
            original_amount_column: col_index(&h, "סכום העסקה"),
            date_format: "%d/%m/%y".into(),
            negate_amounts: true,
            ..CsvProfile::default()
        });
    }

    // Generic English export with a signed amount column
    if h.contains(&"date".into()) && h.contains(&"amount".into()) {
        let merchant = col_index(&h, "description")
            .or_else(|| col_index(&h, "merchant"))
            .or_else(|| col_index(&h, "payee"))?;
        return Some(CsvProfile {
            name: "Generic".into(),
            date_column: col_index(&h, "date").unwrap_or(0),
            merchant_column: merchant,
            amount_column: col_index(&h, "amount"),
            currency_column: col_index(&h, "currency"),
            card_column: col_index(&h, "card"),
            ..CsvProfile::default()
        });
    }

    None
}

fn col_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
