// Topics: what the agent posts about and how it asks the model to say it.
//
// The catalog holds the weighted topic table and hashtag rules; prompts
// holds the persona and the message templates built from a topic.

pub mod catalog;
pub mod prompts;

pub use catalog::{PromptStyle, Topic, TopicCatalog};
