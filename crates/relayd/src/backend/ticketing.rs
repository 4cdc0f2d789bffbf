//! Events-ticketing backend (Discovery API style).

use super::BackendProfile;

pub const DEFAULT_BASE_URL: &str = "https://app.ticketmaster.com/discovery/v2";

const INSTRUCTIONS: &str = "\
You translate a user request into one query against an events-ticketing API.
Valid operations:
- events: search for events
- attractions: search for performers, teams or artists
- venues: search for venues
- classifications: list event categories and genres
- suggest: autocomplete across events, attractions and venues
Valid parameters (all optional, include only what the request implies):
- keyword: free-text search term
- city: city name
- stateCode: state or province code
- countryCode: ISO 3166-1 alpha-2 country code, e.g. US, GB, NO
- postalCode: postal code
- classificationName: category or genre, e.g. music, sports, rock
- startDateTime: earliest start, formatted YYYY-MM-DDTHH:MM:SSZ
- endDateTime: latest start, formatted YYYY-MM-DDTHH:MM:SSZ
- size: number of results, at most 20
- sort: one of date,asc | date,desc | relevance,desc
Date-times must be in UTC with seconds and a trailing Z; never send a bare date.";

pub fn instructions() -> &'static str {
    INSTRUCTIONS
}

pub fn profile(base_url: impl Into<String>, credential: impl Into<String>) -> BackendProfile {
    BackendProfile {
        base_url: base_url.into(),
        credential: credential.into(),
        credential_param: "apikey".to_string(),
        instructions: INSTRUCTIONS.to_string(),
        path_suffix: ".json".to_string(),
    }
}
