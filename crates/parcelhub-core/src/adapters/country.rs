/// Maps a carrier-supplied country value onto an ISO-3166 alpha-2 code.
///
/// Accepts alpha-2 codes in any case and the English (plus a few native)
/// country names some carrier sandboxes send instead of codes.
pub(crate) fn country_code(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Some(trimmed.to_ascii_uppercase());
    }

    let normalized = trimmed
        .trim_start_matches("The ")
        .trim_start_matches("the ")
        .to_lowercase();
    let code = match normalized.as_str() {
        "austria" | "österreich" => "AT",
        "belgium" | "belgië" | "belgique" => "BE",
        "bulgaria" => "BG",
        "croatia" => "HR",
        "cyprus" => "CY",
        "czech republic" | "czechia" => "CZ",
        "denmark" => "DK",
        "estonia" => "EE",
        "finland" => "FI",
        "france" => "FR",
        "germany" | "deutschland" => "DE",
        "greece" => "GR",
        "hungary" => "HU",
        "ireland" => "IE",
        "italy" | "italia" => "IT",
        "latvia" => "LV",
        "lithuania" => "LT",
        "luxembourg" => "LU",
        "malta" => "MT",
        "netherlands" | "holland" | "nederland" => "NL",
        "poland" | "polska" => "PL",
        "portugal" => "PT",
        "romania" => "RO",
        "slovakia" => "SK",
        "slovenia" => "SI",
        "spain" | "españa" => "ES",
        "sweden" => "SE",
        "norway" => "NO",
        "switzerland" | "schweiz" | "suisse" => "CH",
        "iceland" => "IS",
        "united kingdom" | "great britain" | "england" => "GB",
        "united states" | "united states of america" | "usa" => "US",
        "canada" => "CA",
        "mexico" => "MX",
        "australia" => "AU",
        "new zealand" => "NZ",
        "japan" => "JP",
        "china" => "CN",
        "hong kong" => "HK",
        "singapore" => "SG",
        "south korea" | "korea, republic of" => "KR",
        "india" => "IN",
        "turkey" | "türkiye" => "TR",
        "israel" => "IL",
        "united arab emirates" => "AE",
        "brazil" => "BR",
        "south africa" => "ZA",
        _ => return None,
    };
    Some(code.to_owned())
}
