//! Validated mutations of organization data.
//!
//! Every operation reads the current records, checks limits, writes with
//! `try_set` and then records one outbox item per changed entity. A rejected
//! or failed operation writes nothing and queues nothing.
//!
//! Project records are edited as raw JSON: only the record being changed has
//! to parse, the others are written back exactly as they were read.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{OrganizationError, StoreError};
use crate::keys::org;
use crate::kv::KeyValueCache;
use crate::machine::MachineIdentity;
use crate::models::limits::{
    MAX_NOTE_LENGTH, MAX_PINNED_PROJECTS, MAX_TAGS, MAX_TODOS_PER_PROJECT, MAX_TODOS_TOTAL,
};
use crate::models::{
    ManualStatus, ProjectNote, ProjectOrganization, SyncAction, SyncEntity, Tag, TodoItem,
};
use crate::sync_queue::SyncQueue;

type Result<T> = std::result::Result<T, OrganizationError>;

/// Trimmed tag name, unique among `existing` ignoring case.
pub fn validate_tag_name(name: &str, existing: &[Tag]) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(OrganizationError::Validation("tag name cannot be empty".into()));
    }
    let lower = trimmed.to_lowercase();
    if existing.iter().any(|tag| tag.name.to_lowercase() == lower) {
        return Err(OrganizationError::Validation(format!(
            "a tag named {trimmed:?} already exists"
        )));
    }
    Ok(trimmed.to_string())
}

/// Incomplete todos by `order`, then completed ones by `order`.
pub fn sort_todos(mut todos: Vec<TodoItem>) -> Vec<TodoItem> {
    todos.sort_by_key(|todo| (todo.completed, todo.order));
    todos
}

#[derive(Clone)]
pub struct Organizer {
    cache: KeyValueCache,
    queue: SyncQueue,
    machine: MachineIdentity,
}

impl Organizer {
    pub fn new(cache: KeyValueCache) -> Self {
        Self {
            queue: SyncQueue::new(cache.clone()),
            machine: MachineIdentity::new(cache.clone()),
            cache,
        }
    }

    // ── Tags ──────────────────────────────────────────────────────────────

    pub fn create_tag(&self, name: &str, color: &str) -> Result<Tag> {
        let mut tags: Vec<Tag> = self.load(org::TAGS)?;
        let name = validate_tag_name(name, &tags)?;
        if tags.len() >= MAX_TAGS {
            return Err(OrganizationError::LimitReached(format!("at most {MAX_TAGS} tags")));
        }

        let tag = Tag::new(&name, color, Utc::now());
        tags.push(tag.clone());
        self.save(org::TAGS, &tags)?;
        self.record(SyncEntity::Tag, SyncAction::Create, &tag)?;
        info!(tag_id = %tag.id, name = %tag.name, "created tag");
        Ok(tag)
    }

    /// Rename and/or recolor. A new name goes through the same checks as on
    /// creation, against every other tag.
    pub fn update_tag(&self, id: Uuid, name: Option<&str>, color: Option<&str>) -> Result<Tag> {
        let mut tags: Vec<Tag> = self.load(org::TAGS)?;
        let index = tags
            .iter()
            .position(|tag| tag.id == id)
            .ok_or_else(|| OrganizationError::NotFound(format!("tag {id}")))?;

        if let Some(name) = name {
            let others: Vec<Tag> = tags.iter().filter(|tag| tag.id != id).cloned().collect();
            tags[index].name = validate_tag_name(name, &others)?;
        }
        if let Some(color) = color {
            tags[index].color = color.to_string();
        }
        tags[index].updated_at = Utc::now();

        let tag = tags[index].clone();
        self.save(org::TAGS, &tags)?;
        self.record(SyncEntity::Tag, SyncAction::Update, &tag)?;
        Ok(tag)
    }

    /// Remove the tag and strip it from every project. The delete is queued
    /// even when the tag is not stored locally. Returns whether it was.
    pub fn delete_tag(&self, id: Uuid) -> Result<bool> {
        let mut tags: Vec<Tag> = self.load(org::TAGS)?;
        let mut projects = self.projects()?;
        let before = tags.len();
        tags.retain(|tag| tag.id != id);
        let existed = tags.len() != before;

        let id_text = id.to_string();
        let mut stripped = 0usize;
        for record in projects.values_mut() {
            let Some(Value::Array(tag_ids)) = record.get_mut("tagIds") else {
                continue;
            };
            let count = tag_ids.len();
            tag_ids.retain(|tag_id| tag_id.as_str() != Some(id_text.as_str()));
            if tag_ids.len() != count {
                stripped += 1;
            }
        }

        if existed {
            self.save(org::TAGS, &tags)?;
        }
        if stripped > 0 {
            self.save(org::PROJECTS, &projects)?;
        }
        self.record(SyncEntity::Tag, SyncAction::Delete, &json!({ "id": id }))?;
        info!(tag_id = %id, existed, stripped, "deleted tag");
        Ok(existed)
    }

    // ── Project organization ──────────────────────────────────────────────

    /// Returns `false` when the tag was already assigned.
    pub fn assign_tag(&self, project_id: u64, tag_id: Uuid) -> Result<bool> {
        let tags: Vec<Tag> = self.load(org::TAGS)?;
        if !tags.iter().any(|tag| tag.id == tag_id) {
            return Err(OrganizationError::NotFound(format!("tag {tag_id}")));
        }
        let projects = self.projects()?;
        let mut record = project_or_empty(&projects, project_id)?;
        if record.tag_ids.contains(&tag_id) {
            return Ok(false);
        }
        record.tag_ids.push(tag_id);
        self.put_project(projects, &record)?;
        Ok(true)
    }

    /// Returns `false` when the project has no record or not that tag.
    pub fn remove_tag(&self, project_id: u64, tag_id: Uuid) -> Result<bool> {
        let projects = self.projects()?;
        let Some(mut record) = project(&projects, project_id)? else {
            return Ok(false);
        };
        let before = record.tag_ids.len();
        record.tag_ids.retain(|id| *id != tag_id);
        if record.tag_ids.len() == before {
            return Ok(false);
        }
        self.put_project(projects, &record)?;
        Ok(true)
    }

    /// Returns the new favorite flag.
    pub fn toggle_favorite(&self, project_id: u64) -> Result<bool> {
        let projects = self.projects()?;
        let mut record = project_or_empty(&projects, project_id)?;
        record.is_favorite = !record.is_favorite;
        self.put_project(projects, &record)?;
        Ok(record.is_favorite)
    }

    /// Returns the new pinned flag. Pinning fails once
    /// [`MAX_PINNED_PROJECTS`] projects are pinned; unpinning always works.
    pub fn toggle_pin(&self, project_id: u64) -> Result<bool> {
        let projects = self.projects()?;
        let mut record = project_or_empty(&projects, project_id)?;
        if !record.is_pinned {
            let pinned = projects
                .values()
                .filter(|record| record.get("isPinned").and_then(Value::as_bool) == Some(true))
                .count();
            if pinned >= MAX_PINNED_PROJECTS {
                return Err(OrganizationError::LimitReached(format!(
                    "at most {MAX_PINNED_PROJECTS} pinned projects"
                )));
            }
        }
        record.is_pinned = !record.is_pinned;
        self.put_project(projects, &record)?;
        Ok(record.is_pinned)
    }

    /// Set or clear the manual status. The status date is stamped on set and
    /// cleared with the status.
    pub fn set_manual_status(
        &self,
        project_id: u64,
        status: Option<ManualStatus>,
    ) -> Result<ProjectOrganization> {
        let projects = self.projects()?;
        let mut record = project_or_empty(&projects, project_id)?;
        record.manual_status = status;
        record.manual_status_date = status.map(|_| Utc::now());
        self.put_project(projects, &record)?;
        Ok(record)
    }

    /// Flip whether the project is cloned on this machine. Returns the new
    /// state. Needs a machine identity, which startup creates.
    pub fn toggle_clone_status(&self, project_id: u64) -> Result<bool> {
        let machine = self
            .machine
            .info()
            .ok_or_else(|| OrganizationError::NotFound("machine identity".into()))?;
        let machine_id = machine.id.to_string();

        let projects = self.projects()?;
        let mut record = project_or_empty(&projects, project_id)?;
        let cloned = if record.cloned_on_machines.contains(&machine_id) {
            record.cloned_on_machines.retain(|id| *id != machine_id);
            false
        } else {
            record.cloned_on_machines.push(machine_id);
            true
        };
        self.put_project(projects, &record)?;
        Ok(cloned)
    }

    // ── Notes ─────────────────────────────────────────────────────────────

    /// Create or replace the project note, cut to [`MAX_NOTE_LENGTH`]
    /// characters. The creation time survives replacement.
    pub fn save_note(&self, project_id: u64, content: &str) -> Result<ProjectNote> {
        let mut notes: BTreeMap<u64, ProjectNote> = self.load(org::NOTES)?;
        let now = Utc::now();
        let existing = notes.get(&project_id);
        let action = if existing.is_some() {
            SyncAction::Update
        } else {
            SyncAction::Create
        };

        let note = ProjectNote {
            project_id,
            content: content.chars().take(MAX_NOTE_LENGTH).collect(),
            created_at: existing.map_or(now, |note| note.created_at),
            updated_at: now,
        };
        notes.insert(project_id, note.clone());
        self.save(org::NOTES, &notes)?;
        self.record(SyncEntity::Note, action, &note)?;
        Ok(note)
    }

    /// Returns `false`, queueing nothing, when there is no note.
    pub fn delete_note(&self, project_id: u64) -> Result<bool> {
        let mut notes: BTreeMap<u64, ProjectNote> = self.load(org::NOTES)?;
        if notes.remove(&project_id).is_none() {
            return Ok(false);
        }
        self.save(org::NOTES, &notes)?;
        self.record(
            SyncEntity::Note,
            SyncAction::Delete,
            &json!({ "projectId": project_id }),
        )?;
        Ok(true)
    }

    // ── Todos ─────────────────────────────────────────────────────────────

    /// Append a todo after the project's last one.
    pub fn add_todo(&self, project_id: u64, description: &str) -> Result<TodoItem> {
        let description = description.trim();
        if description.is_empty() {
            return Err(OrganizationError::Validation("todo description cannot be empty".into()));
        }

        let mut todos: Vec<TodoItem> = self.load(org::TODOS)?;
        let in_project: Vec<&TodoItem> =
            todos.iter().filter(|todo| todo.project_id == project_id).collect();
        if in_project.len() >= MAX_TODOS_PER_PROJECT {
            return Err(OrganizationError::LimitReached(format!(
                "at most {MAX_TODOS_PER_PROJECT} todos per project"
            )));
        }
        if todos.len() >= MAX_TODOS_TOTAL {
            return Err(OrganizationError::LimitReached(format!(
                "at most {MAX_TODOS_TOTAL} todos"
            )));
        }
        let order = in_project
            .iter()
            .map(|todo| todo.order)
            .max()
            .map_or(0, |max| max.saturating_add(1));

        let now = Utc::now();
        let todo = TodoItem {
            id: Uuid::new_v4(),
            project_id,
            description: description.to_string(),
            completed: false,
            order,
            created_at: now,
            updated_at: now,
        };
        todos.push(todo.clone());
        self.save(org::TODOS, &todos)?;
        self.record(SyncEntity::Todo, SyncAction::Create, &todo)?;
        Ok(todo)
    }

    pub fn toggle_todo(&self, id: Uuid) -> Result<TodoItem> {
        let mut todos: Vec<TodoItem> = self.load(org::TODOS)?;
        let todo = todos
            .iter_mut()
            .find(|todo| todo.id == id)
            .ok_or_else(|| OrganizationError::NotFound(format!("todo {id}")))?;
        todo.completed = !todo.completed;
        todo.updated_at = Utc::now();
        let todo = todo.clone();

        self.save(org::TODOS, &todos)?;
        self.record(SyncEntity::Todo, SyncAction::Update, &todo)?;
        Ok(todo)
    }

    /// The delete is queued even for an unknown id. Returns whether the todo
    /// was stored locally.
    pub fn delete_todo(&self, id: Uuid) -> Result<bool> {
        let mut todos: Vec<TodoItem> = self.load(org::TODOS)?;
        let before = todos.len();
        todos.retain(|todo| todo.id != id);
        let existed = todos.len() != before;
        if existed {
            self.save(org::TODOS, &todos)?;
        }
        self.record(SyncEntity::Todo, SyncAction::Delete, &json!({ "id": id }))?;
        Ok(existed)
    }

    /// Give each of the project's todos listed in `ids` its position as
    /// `order`. Unlisted todos keep theirs. Every todo of the project is
    /// queued as an update. Returns how many were reordered.
    pub fn reorder_todos(&self, project_id: u64, ids: &[Uuid]) -> Result<usize> {
        let mut todos: Vec<TodoItem> = self.load(org::TODOS)?;
        let now = Utc::now();
        let mut reordered = 0usize;
        for todo in todos.iter_mut().filter(|todo| todo.project_id == project_id) {
            let Some(position) = ids.iter().position(|id| *id == todo.id) else {
                continue;
            };
            todo.order = u32::try_from(position).unwrap_or(u32::MAX);
            todo.updated_at = now;
            reordered += 1;
        }
        if reordered == 0 {
            return Ok(0);
        }

        let payloads = todos
            .iter()
            .filter(|todo| todo.project_id == project_id)
            .map(payload)
            .collect::<Result<Vec<_>>>()?;
        self.save(org::TODOS, &todos)?;
        for data in payloads {
            self.queue.enqueue(SyncEntity::Todo, SyncAction::Update, data);
        }
        debug!(project_id, reordered, "reordered todos");
        Ok(reordered)
    }

    /// Drop the project's completed todos, queueing one delete each.
    pub fn clear_completed_todos(&self, project_id: u64) -> Result<usize> {
        let todos: Vec<TodoItem> = self.load(org::TODOS)?;
        let (removed, kept): (Vec<TodoItem>, Vec<TodoItem>) = todos
            .into_iter()
            .partition(|todo| todo.project_id == project_id && todo.completed);
        if removed.is_empty() {
            return Ok(0);
        }
        self.save(org::TODOS, &kept)?;
        for todo in &removed {
            self.queue
                .enqueue(SyncEntity::Todo, SyncAction::Delete, json!({ "id": todo.id }));
        }
        debug!(project_id, removed = removed.len(), "cleared completed todos");
        Ok(removed.len())
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// The stored record, or an empty one when it is missing or unreadable.
    pub fn project_organization(&self, project_id: u64) -> ProjectOrganization {
        let projects: Map<String, Value> = self.cache.get(org::PROJECTS, Map::new());
        project(&projects, project_id)
            .ok()
            .flatten()
            .unwrap_or_else(|| ProjectOrganization::empty(project_id))
    }

    pub fn project_todos(&self, project_id: u64) -> Vec<TodoItem> {
        let todos: Vec<TodoItem> = self.cache.get(org::TODOS, Vec::new());
        sort_todos(
            todos
                .into_iter()
                .filter(|todo| todo.project_id == project_id)
                .collect(),
        )
    }

    pub fn incomplete_todo_count(&self, project_id: u64) -> usize {
        let todos: Vec<TodoItem> = self.cache.get(org::TODOS, Vec::new());
        todos
            .iter()
            .filter(|todo| todo.project_id == project_id && !todo.completed)
            .count()
    }

    // ── Plumbing ──────────────────────────────────────────────────────────

    fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        Ok(self.cache.try_get(key)?.unwrap_or_default())
    }

    fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        Ok(self.cache.try_set(key, value)?)
    }

    fn projects(&self) -> Result<Map<String, Value>> {
        self.load(org::PROJECTS)
    }

    fn put_project(&self, mut projects: Map<String, Value>, record: &ProjectOrganization) -> Result<()> {
        let data = payload(record)?;
        projects.insert(record.project_id.to_string(), data.clone());
        self.save(org::PROJECTS, &projects)?;
        self.queue.enqueue(SyncEntity::ProjectOrg, SyncAction::Update, data);
        Ok(())
    }

    fn record<T: Serialize>(&self, entity: SyncEntity, action: SyncAction, data: &T) -> Result<()> {
        self.queue.enqueue(entity, action, payload(data)?);
        Ok(())
    }
}

fn payload<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value).map_err(StoreError::from)?)
}

/// Parse one record out of the raw project map. Only that record has to be
/// readable.
fn project(projects: &Map<String, Value>, project_id: u64) -> Result<Option<ProjectOrganization>> {
    let key = project_id.to_string();
    let Some(raw) = projects.get(&key) else {
        return Ok(None);
    };
    serde_json::from_value(raw.clone())
        .map(Some)
        .map_err(|e| {
            OrganizationError::Store(StoreError::CorruptData {
                key: format!("{}[{key}]", org::PROJECTS),
                reason: e.to_string(),
            })
        })
}

fn project_or_empty(projects: &Map<String, Value>, project_id: u64) -> Result<ProjectOrganization> {
    Ok(project(projects, project_id)?.unwrap_or_else(|| ProjectOrganization::empty(project_id)))
}
