//! Shared-resource extraction
//!
//! Resources (origin IPs, wallet tokens) are what tie otherwise unrelated
//! domains to one operator. Collaborators should attach them to signals as
//! structured [`Resource`](crate::Resource)s. Signals without structured
//! resources fall back to scraping the free-text description:
//! - INFRA signals mentioning "origin IP": first token that parses as an IP
//! - PAYMENT signals mentioning "cryptocurrency address": first token after
//!   the first ':' that is 21-49 characters long

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::{Category, ResourceKind, Signal};

/// Resources extracted for one domain, one value per kind
pub type ResourceMap = BTreeMap<ResourceKind, String>;

const ORIGIN_IP_MARKER: &str = "origin IP";
const WALLET_MARKER: &str = "cryptocurrency address";
const WALLET_MIN_LEN: usize = 21;
const WALLET_MAX_LEN: usize = 49;

/// Wrapping punctuation stripped from IP tokens before parsing. A trailing
/// sentence period is stripped separately.
const IP_TOKEN_PUNCTUATION: &[char] = &[',', ';', '(', ')', '[', ']', '"', '\''];

/// Extract resources from a domain's signals; later signals win per kind
pub fn extract_resources(signals: &[Signal]) -> ResourceMap {
    let mut resources = ResourceMap::new();

    for signal in signals {
        if !signal.resources.is_empty() {
            for resource in &signal.resources {
                resources.insert(resource.kind, resource.value.clone());
            }
            continue;
        }

        if let Some((kind, value)) = resource_from_description(signal) {
            resources.insert(kind, value);
        }
    }

    resources
}

fn resource_from_description(signal: &Signal) -> Option<(ResourceKind, String)> {
    match signal.category {
        Category::Infra if signal.description.contains(ORIGIN_IP_MARKER) => {
            ip_from_description(&signal.description).map(|ip| (ResourceKind::Ip, ip))
        }
        Category::Payment if signal.description.contains(WALLET_MARKER) => {
            wallet_from_description(&signal.description).map(|w| (ResourceKind::Wallet, w))
        }
        _ => None,
    }
}

/// First whitespace-separated token that is an IPv4 or IPv6 address
///
/// Tokens may end a sentence and be wrapped in brackets, quotes or
/// separators, so "origin IP (203.0.113.7)." still yields the address.
pub fn ip_from_description(description: &str) -> Option<String> {
    description
        .split_whitespace()
        .map(|token| token.strip_suffix('.').unwrap_or(token))
        .map(|token| token.trim_matches(IP_TOKEN_PUNCTUATION))
        .find(|token| token.parse::<IpAddr>().is_ok())
        .map(str::to_string)
}

/// First wallet-length token after the first ':'
pub fn wallet_from_description(description: &str) -> Option<String> {
    let (_, rest) = description.split_once(':')?;
    rest.split(' ')
        .map(str::trim)
        .find(|token| (WALLET_MIN_LEN..=WALLET_MAX_LEN).contains(&token.len()))
        .map(str::to_string)
}
