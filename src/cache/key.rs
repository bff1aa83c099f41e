//! Cache keys.

use std::fmt::{self, Display, Formatter};

use url::form_urlencoded;

use crate::engine::request::FetchParams;
use crate::registry::Category;

/// `category?k=v&...` with params in sorted order, so equivalent requests
/// share an entry regardless of parameter order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(category: &Category, params: &FetchParams) -> Self {
        let mut key = category.as_str().to_string();
        if !params.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            key.push('?');
            key.push_str(&query);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_order_does_not_matter() {
        let a = FetchParams::from_pairs([("symbol", "BTC"), ("vs", "usd")]);
        let b = FetchParams::from_pairs([("vs", "usd"), ("symbol", "BTC")]);
        let category = Category::new("market_price");

        assert_eq!(CacheKey::new(&category, &a), CacheKey::new(&category, &b));
        assert_eq!(CacheKey::new(&category, &a).as_str(), "market_price?symbol=BTC&vs=usd");
    }

    #[test]
    fn no_params_is_bare_category() {
        let key = CacheKey::new(&Category::new("News"), &FetchParams::default());
        assert_eq!(key.as_str(), "news");
    }
}
