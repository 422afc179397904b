//! Message translation with tiered fallback.
//!
//! A key is looked up in the requested locale (`th-TH`), then in its base
//! language (`th`), then in the default locale. If no dictionary knows the key,
//! the key itself is returned.
use std::collections::HashMap;

use axum::extract::Request;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;

use crate::env;
use crate::error::ErrorBody;

const DICTIONARIES: [(&str, &str); 2] = [
    ("en", include_str!("i18n/en.json")),
    ("th", include_str!("i18n/th.json")),
];

lazy_static::lazy_static! {
    pub static ref TRANSLATIONS: Translations = Translations::embedded(env::DEFAULT_LOCALE.as_str());
}

pub struct Translations {
    dictionaries: HashMap<String, HashMap<String, String>>,
    default_locale: String,
}

impl Translations {
    pub fn new(
        dictionaries: HashMap<String, HashMap<String, String>>,
        default_locale: &str,
    ) -> Self {
        Self {
            dictionaries,
            default_locale: normalize(default_locale),
        }
    }

    fn embedded(default_locale: &str) -> Self {
        let mut dictionaries = HashMap::new();
        for (locale, data) in DICTIONARIES {
            match serde_json::from_str::<HashMap<String, String>>(data) {
                Ok(dictionary) => {
                    dictionaries.insert(locale.to_owned(), dictionary);
                }
                Err(e) => error!("Could not load dictionary '{}': {}", locale, e),
            }
        }
        Self::new(dictionaries, default_locale)
    }

    pub fn lookup(&self, locale: &str, key: &str) -> String {
        let locale = normalize(locale);
        let language = locale.split('-').next().unwrap_or_default();

        for candidate in [locale.as_str(), language, self.default_locale.as_str()] {
            if let Some(text) = self
                .dictionaries
                .get(candidate)
                .and_then(|dictionary| dictionary.get(key))
            {
                return text.to_owned();
            }
        }

        key.to_owned()
    }

    /// Lookup a message that refers to a single field, eg. `{field} is too long.`
    pub fn lookup_field(&self, locale: &str, key: &str, field: &str) -> String {
        self.lookup(locale, key).replace("{field}", field)
    }
}

fn normalize(locale: &str) -> String {
    locale.trim().replace('_', "-").to_lowercase()
}

/// First language tag of an `Accept-Language` header, quality values are ignored.
pub fn requested_locale(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::ACCEPT_LANGUAGE)?.to_str().ok()?;
    let tag = value.split(',').next()?.split(';').next()?.trim();

    if tag.is_empty() || tag == "*" {
        return None;
    }

    Some(tag.to_owned())
}

/// Rewrites the messages of error responses to the locale the client asked for.
pub async fn localize_errors(request: Request, next: Next) -> Response {
    let locale = requested_locale(request.headers());
    let mut response = next.run(request).await;

    let Some(locale) = locale else {
        return response;
    };

    if let Some(body) = response.extensions_mut().remove::<ErrorBody>() {
        let status = response.status();
        let body = body.localized(&TRANSLATIONS, &locale);
        return (status, Json(body)).into_response();
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn translations() -> Translations {
        let mut en = HashMap::new();
        en.insert("greeting".to_owned(), "Hello".to_owned());
        en.insert("farewell".to_owned(), "Bye".to_owned());
        en.insert("field_required".to_owned(), "{field} is required".to_owned());

        let mut th = HashMap::new();
        th.insert("greeting".to_owned(), "สวัสดี".to_owned());

        let mut th_th = HashMap::new();
        th_th.insert("greeting".to_owned(), "สวัสดีครับ".to_owned());

        let mut dictionaries = HashMap::new();
        dictionaries.insert("en".to_owned(), en);
        dictionaries.insert("th".to_owned(), th);
        dictionaries.insert("th-th".to_owned(), th_th);

        Translations::new(dictionaries, "en")
    }

    #[test]
    fn exact_locale_wins() {
        assert_eq!(translations().lookup("th-TH", "greeting"), "สวัสดีครับ");
    }

    #[test]
    fn falls_back_to_base_language() {
        assert_eq!(translations().lookup("th-LA", "greeting"), "สวัสดี");
        assert_eq!(translations().lookup("th_la", "greeting"), "สวัสดี");
    }

    #[test]
    fn falls_back_to_default_locale() {
        assert_eq!(translations().lookup("th-TH", "farewell"), "Bye");
        assert_eq!(translations().lookup("de", "greeting"), "Hello");
    }

    #[test]
    fn unknown_key_is_returned_verbatim() {
        assert_eq!(translations().lookup("th", "no_such_key"), "no_such_key");
    }

    #[test]
    fn field_placeholder_is_substituted() {
        assert_eq!(
            translations().lookup_field("en", "field_required", "name"),
            "name is required"
        );
    }

    #[test]
    fn embedded_dictionaries_load() {
        let translations = Translations::embedded("en");
        assert_eq!(
            translations.lookup("en", "table_occupied"),
            "The table is already occupied."
        );
        assert_ne!(translations.lookup("th", "table_occupied"), "table_occupied");
        assert_eq!(
            translations.lookup("de-DE", "table_occupied"),
            "The table is already occupied."
        );
    }

    #[test]
    fn embedded_dictionaries_share_keys() {
        let translations = Translations::embedded("en");
        let en = &translations.dictionaries["en"];
        let th = &translations.dictionaries["th"];
        assert!(th.keys().all(|key| en.contains_key(key)));
        assert!(en.keys().all(|key| th.contains_key(key)));
    }

    #[test]
    fn accept_language_takes_first_tag() {
        let mut headers = HeaderMap::new();
        assert_eq!(requested_locale(&headers), None);

        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("th-TH,th;q=0.9,en;q=0.8"),
        );
        assert_eq!(requested_locale(&headers), Some("th-TH".to_owned()));

        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("*"));
        assert_eq!(requested_locale(&headers), None);
    }
}
