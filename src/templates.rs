//! Template lookup and placeholder rendering.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::Fault;
use crate::store::{Entity, RecordStore, Template};

pub const NAME_TOKEN: &str = "{name}";
pub const SURNAME_TOKEN: &str = "{surname}";
pub const ENTITY_TOKEN: &str = "{entity}";

/// A template with its target references resolved to entities.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct TemplateDetails {
    #[serde(flatten)]
    pub template: Template,
    pub targets: Vec<Entity>,
}

#[derive(Clone)]
pub struct TemplateEngine {
    store: Arc<dyn RecordStore>,
}

impl TemplateEngine {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// Returns `Store` if the templates cannot be loaded.
    pub async fn list_templates(&self) -> Result<Vec<Template>, Fault> {
        Ok(self.store.list_templates().await?)
    }

    /// Every template with its targets expanded. Targets are fetched in one
    /// lookup and ids that no longer resolve are skipped.
    ///
    /// # Errors
    /// Returns `Store` if templates or entities cannot be loaded.
    pub async fn list_templates_with_targets(&self) -> Result<Vec<TemplateDetails>, Fault> {
        let templates = self.store.list_templates().await?;

        let mut wanted: Vec<Uuid> = templates
            .iter()
            .flat_map(|template| template.target_entity_ids.iter().copied())
            .collect();
        wanted.sort_unstable();
        wanted.dedup();

        let entities: HashMap<Uuid, Entity> = self
            .store
            .entities_by_ids(&wanted)
            .await?
            .into_iter()
            .map(|entity| (entity.id, entity))
            .collect();

        Ok(templates
            .into_iter()
            .map(|template| {
                let targets = template
                    .target_entity_ids
                    .iter()
                    .filter_map(|id| entities.get(id).cloned())
                    .collect();
                TemplateDetails { template, targets }
            })
            .collect())
    }

    /// # Errors
    /// `NotFound` for an unknown id, `Store` if the lookup fails.
    pub async fn get_template(&self, id: Uuid) -> Result<Template, Fault> {
        self.store
            .get_template(id)
            .await?
            .ok_or(Fault::NotFound {
                kind: "template",
                id,
            })
    }

    /// Target entities of `template_id`, in the template's order.
    ///
    /// # Errors
    /// `NotFound` for an unknown template, `Store` if the lookup fails.
    pub async fn associated_entities(&self, template_id: Uuid) -> Result<Vec<Entity>, Fault> {
        let template = self.get_template(template_id).await?;
        Ok(self
            .store
            .entities_by_ids(&template.target_entity_ids)
            .await?)
    }
}

/// Replace every occurrence of each mapped token in `content`.
///
/// Scanning is left to right and never revisits substituted text. When two
/// tokens start at the same position the longer one wins. Unmapped tokens and
/// empty keys are left alone.
#[must_use]
pub fn render(content: &str, substitutions: &BTreeMap<String, String>) -> String {
    let tokens: Vec<(&str, &str)> = substitutions
        .iter()
        .filter(|(token, _)| !token.is_empty())
        .map(|(token, value)| (token.as_str(), value.as_str()))
        .collect();

    if tokens.is_empty() {
        return content.to_string();
    }

    let mut rendered = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(ch) = rest.chars().next() {
        let hit = tokens
            .iter()
            .filter(|(token, _)| rest.starts_with(token))
            .max_by_key(|(token, _)| token.len());

        if let Some((token, value)) = hit {
            rendered.push_str(value);
            rest = &rest[token.len()..];
        } else {
            rendered.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }
    rendered
}

/// Substitutions for a civic letter.
///
/// Letters go out as HTML, so every value is escaped here. [`render`] itself
/// stays literal.
#[must_use]
pub fn letter_substitutions(
    name: &str,
    surname: &str,
    entity: Option<&str>,
) -> BTreeMap<String, String> {
    let escape = |value: &str| html_escape::encode_safe(value).into_owned();
    let mut substitutions = BTreeMap::from([
        (NAME_TOKEN.to_string(), escape(name)),
        (SURNAME_TOKEN.to_string(), escape(surname)),
    ]);
    if let Some(entity) = entity {
        substitutions.insert(ENTITY_TOKEN.to_string(), escape(entity));
    }
    substitutions
}
