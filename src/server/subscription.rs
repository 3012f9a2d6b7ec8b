// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Client-initiated subscriptions (`CLSUB`/`CLUSUB`). A subscription
//! remembers the transaction-id of its originating `CLSUB` request and
//! echoes it in every `PUB` the server later emits, so a client with
//! several subscriptions on the same parameter can tell them apart.

/// One standing subscription against a single parameter.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub txid: u16,
    pub path: String,
    pub criterion: String,
}

impl Subscription {
    /// Decide whether a newly published value should be delivered to
    /// this subscription. An empty criterion always matches. A
    /// criterion of the form `<op><number>` (`>`, `<`, `=`) compares
    /// against the published value's numeric rendering; anything else
    /// is treated as "always notify" since criteria are free-form text
    /// interpreted per parameter.
    pub fn matches(&self, published_text: &str) -> bool {
        let c = self.criterion.trim();
        if c.is_empty() {
            return true;
        }
        let mut chars = c.chars();
        let Some(op) = chars.next() else {
            return true;
        };
        let rest = chars.as_str();
        let Ok(threshold) = rest.trim().parse::<f64>() else {
            return true;
        };
        let Ok(value) = published_text.parse::<f64>() else {
            return true;
        };
        match op {
            '>' => value > threshold,
            '<' => value < threshold,
            '=' => (value - threshold).abs() < f64::EPSILON,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(criterion: &str) -> Subscription {
        Subscription {
            txid: 1,
            path: "/x".to_string(),
            criterion: criterion.to_string(),
        }
    }

    #[test]
    fn empty_criterion_always_matches() {
        assert!(sub("").matches("42"));
    }

    #[test]
    fn greater_than_criterion() {
        assert!(sub(">10").matches("11"));
        assert!(!sub(">10").matches("9"));
    }

    #[test]
    fn less_than_criterion() {
        assert!(sub("<10").matches("5"));
        assert!(!sub("<10").matches("50"));
    }

    #[test]
    fn unparseable_published_value_defaults_to_notify() {
        assert!(sub(">10").matches("not-a-number"));
    }
}
