// Topic catalog and hashtag composition.
//
// Each cycle picks one topic: with probability DOMAIN_WEIGHT one of the
// domain topics (explained in the educational style), otherwise the generic
// territorial topic. A topic's tags decide which hashtags the prompt asks
// for, on top of the fixed base set every post carries.

use std::collections::BTreeSet;

use rand::seq::IndexedRandom;
use rand::Rng;

/// Hashtags every post carries.
pub const BASE_HASHTAGS: [&str; 2] = ["#bruh", "#storyprotocol"];

/// Probability of choosing a domain topic over the territorial one.
pub const DOMAIN_WEIGHT: f64 = 0.7;

/// Extra hashtags for a topic tag. Unknown tags contribute nothing.
pub fn hashtags_for_tag(tag: &str) -> &'static [&'static str] {
    match tag {
        "nft" => &["#bruhnft", "#nft"],
        "ai" => &["#kaitoai"],
        "ip" => &["#nft", "#bruhnft"],
        _ => &[],
    }
}

/// How the prompt frames a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Explain the topic simply.
    Educational,
    /// Comically mark territory on a trending topic.
    Territorial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub label: String,
    pub tags: BTreeSet<String>,
    pub style: PromptStyle,
}

impl Topic {
    pub fn new(label: &str, tags: &[&str], style: PromptStyle) -> Self {
        Self {
            label: label.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            style,
        }
    }

    /// Base hashtags plus every tag's hashtags, deduplicated and sorted.
    pub fn hashtags(&self) -> BTreeSet<&'static str> {
        let mut set: BTreeSet<&'static str> = BASE_HASHTAGS.into_iter().collect();
        for tag in &self.tags {
            set.extend(hashtags_for_tag(tag));
        }
        set
    }

    /// Hashtags as they should appear at the end of a post.
    pub fn hashtag_line(&self) -> String {
        self.hashtags().into_iter().collect::<Vec<_>>().join(" ")
    }
}

/// The weighted topic table.
#[derive(Debug, Clone)]
pub struct TopicCatalog {
    domain: Vec<Topic>,
    territorial: Topic,
    domain_weight: f64,
}

impl Default for TopicCatalog {
    fn default() -> Self {
        use PromptStyle::Educational;

        let domain = vec![
            Topic::new("La importancia de la propiedad intelectual en Web3", &["ip"], Educational),
            Topic::new("Cómo Story Protocol está revolucionando los derechos de IP", &["ip"], Educational),
            Topic::new("El futuro de la creatividad y AI en blockchain", &["ai"], Educational),
            Topic::new("NFTs y derechos de IP en Story Protocol", &["nft", "ip"], Educational),
            Topic::new("Monetización de IP y NFTs en Web3", &["nft", "ip"], Educational),
            Topic::new("Colaboración creativa con AI en blockchain", &["ai"], Educational),
            Topic::new("Protección de IP para NFTs", &["nft", "ip"], Educational),
        ];

        Self {
            domain,
            territorial: Topic::new("Bruh NFT Lifestyle", &["nft"], PromptStyle::Territorial),
            domain_weight: DOMAIN_WEIGHT,
        }
    }
}

impl TopicCatalog {
    /// Build a catalog from explicit parts. `domain_weight` is clamped to
    /// [0, 1]; an empty domain list always yields the territorial topic.
    pub fn new(domain: Vec<Topic>, territorial: Topic, domain_weight: f64) -> Self {
        Self {
            domain,
            territorial,
            domain_weight: domain_weight.clamp(0.0, 1.0),
        }
    }

    pub fn domain_topics(&self) -> &[Topic] {
        &self.domain
    }

    pub fn territorial(&self) -> &Topic {
        &self.territorial
    }

    /// Weighted choice: a uniform domain topic with probability
    /// `domain_weight`, otherwise the territorial topic.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &Topic {
        if rng.random_bool(self.domain_weight) {
            if let Some(topic) = self.domain.choose(rng) {
                return topic;
            }
        }
        &self.territorial
    }
}
