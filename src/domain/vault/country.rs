//! Country lookup used to keep address country fields consistent.
//!
//! The gateway accepts any one of four country representations. Addresses
//! resolve whichever one they were given and fill in the rest, so
//! `country_code_alpha2` is always populated for a known country.

use crate::domain::foundation::Record;

/// One row of the country table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Country {
    pub name: &'static str,
    pub alpha2: &'static str,
    pub alpha3: &'static str,
    pub numeric: &'static str,
}

const fn country(
    name: &'static str,
    alpha2: &'static str,
    alpha3: &'static str,
    numeric: &'static str,
) -> Country {
    Country {
        name,
        alpha2,
        alpha3,
        numeric,
    }
}

static COUNTRIES: &[Country] = &[
    country("Argentina", "AR", "ARG", "032"),
    country("Australia", "AU", "AUS", "036"),
    country("Austria", "AT", "AUT", "040"),
    country("Belgium", "BE", "BEL", "056"),
    country("Brazil", "BR", "BRA", "076"),
    country("Canada", "CA", "CAN", "124"),
    country("Chile", "CL", "CHL", "152"),
    country("China", "CN", "CHN", "156"),
    country("Colombia", "CO", "COL", "170"),
    country("Czech Republic", "CZ", "CZE", "203"),
    country("Denmark", "DK", "DNK", "208"),
    country("Finland", "FI", "FIN", "246"),
    country("France", "FR", "FRA", "250"),
    country("Germany", "DE", "DEU", "276"),
    country("Greece", "GR", "GRC", "300"),
    country("Hong Kong", "HK", "HKG", "344"),
    country("India", "IN", "IND", "356"),
    country("Ireland", "IE", "IRL", "372"),
    country("Israel", "IL", "ISR", "376"),
    country("Italy", "IT", "ITA", "380"),
    country("Japan", "JP", "JPN", "392"),
    country("Korea, Republic of", "KR", "KOR", "410"),
    country("Mexico", "MX", "MEX", "484"),
    country("Netherlands", "NL", "NLD", "528"),
    country("New Zealand", "NZ", "NZL", "554"),
    country("Norway", "NO", "NOR", "578"),
    country("Poland", "PL", "POL", "616"),
    country("Portugal", "PT", "PRT", "620"),
    country("Singapore", "SG", "SGP", "702"),
    country("South Africa", "ZA", "ZAF", "710"),
    country("Spain", "ES", "ESP", "724"),
    country("Sweden", "SE", "SWE", "752"),
    country("Switzerland", "CH", "CHE", "756"),
    country("United Kingdom", "GB", "GBR", "826"),
    country("United States of America", "US", "USA", "840"),
];

/// Country fields in resolution priority order.
pub const COUNTRY_FIELDS: [&str; 4] = [
    "country_code_alpha2",
    "country_code_alpha3",
    "country_code_numeric",
    "country_name",
];

pub fn by_alpha2(code: &str) -> Option<&'static Country> {
    COUNTRIES
        .iter()
        .find(|c| c.alpha2.eq_ignore_ascii_case(code.trim()))
}

pub fn by_alpha3(code: &str) -> Option<&'static Country> {
    COUNTRIES
        .iter()
        .find(|c| c.alpha3.eq_ignore_ascii_case(code.trim()))
}

pub fn by_numeric(code: &str) -> Option<&'static Country> {
    let code = code.trim();
    COUNTRIES
        .iter()
        .find(|c| c.numeric == code || c.numeric.trim_start_matches('0') == code)
}

pub fn by_name(name: &str) -> Option<&'static Country> {
    COUNTRIES
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
}

/// Resolves the country from whichever field is set, in priority order.
pub fn resolve(record: &Record) -> Option<&'static Country> {
    COUNTRY_FIELDS.iter().find_map(|field| {
        let value = record.get_string(field)?;
        match *field {
            "country_code_alpha2" => by_alpha2(&value),
            "country_code_alpha3" => by_alpha3(&value),
            "country_code_numeric" => by_numeric(&value),
            _ => by_name(&value),
        }
    })
}

/// Rewrites all four country fields from the resolved country.
///
/// Unknown values are left untouched for the gateway to judge.
pub fn normalize(record: &mut Record) {
    if let Some(country) = resolve(record) {
        record.set("country_code_alpha2", country.alpha2);
        record.set("country_code_alpha3", country.alpha3);
        record.set("country_code_numeric", country.numeric);
        record.set("country_name", country.name);
    }
}
