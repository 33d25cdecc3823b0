// Kbts Rule Assembler
// Orders rule groups and checks flag ownership across them

use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::fragment::{Flag, Manipulator, RuleFragment, Trigger};
use crate::key::KeyCode;
use crate::Error;

/// A named, ordered list of fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup {
    name: String,
    fragments: Vec<RuleFragment>,
}

impl RuleGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fragments: Vec::new(),
        }
    }

    pub fn with_fragments(name: impl Into<String>, fragments: Vec<RuleFragment>) -> Self {
        Self {
            name: name.into(),
            fragments,
        }
    }

    /// Append a fragment after the ones already declared
    pub fn push(&mut self, fragment: RuleFragment) {
        self.fragments.push(fragment);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fragments(&self) -> &[RuleFragment] {
        &self.fragments
    }

    /// Manipulators of every fragment, in declaration order
    pub fn manipulators(&self) -> impl Iterator<Item = &Manipulator> {
        self.fragments.iter().flat_map(|f| f.manipulators())
    }
}

/// The assembled, ordered rule list.
///
/// Consumers apply first-match-wins over [`RuleSet::manipulators`]: for an
/// event two manipulators could both match, the earlier one governs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    groups: Vec<RuleGroup>,
}

impl RuleSet {
    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    /// Every manipulator in precedence order
    pub fn manipulators(&self) -> impl Iterator<Item = &Manipulator> {
        self.groups.iter().flat_map(|g| g.manipulators())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.fragments.is_empty())
    }
}

/// Assemble groups in the given order
pub fn assemble(groups: Vec<RuleGroup>) -> Result<RuleSet, Error> {
    for (i, group) in groups.iter().enumerate() {
        if groups[..i].iter().any(|g| g.name == group.name) {
            return Err(Error::DuplicateGroup(group.name.clone()));
        }
    }

    let writers = flag_writers(&groups)?;
    for (reader_index, group) in groups.iter().enumerate() {
        for fragment in &group.fragments {
            for flag in fragment.reads() {
                let Some(&(writer_index, _)) = writers.get(flag) else {
                    return Err(Error::UnknownFlag {
                        flag: flag.to_string(),
                        reader: fragment.description().to_string(),
                    });
                };
                if writer_index > reader_index {
                    return Err(Error::FlagOrder {
                        flag: flag.to_string(),
                        reader_group: group.name.clone(),
                        writer_group: groups[writer_index].name.clone(),
                    });
                }
            }
        }
    }

    log_shadowing(&groups);
    log::debug!(
        "assembled {} groups: {}",
        groups.len(),
        groups
            .iter()
            .map(|g| g.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(RuleSet { groups })
}

/// Assemble groups in a caller-specified order.
///
/// `order` must name every group exactly once.
pub fn assemble_ordered<S: AsRef<str>>(groups: Vec<RuleGroup>, order: &[S]) -> Result<RuleSet, Error> {
    let mut by_name: IndexMap<String, RuleGroup> = IndexMap::new();
    for group in groups {
        match by_name.entry(group.name.clone()) {
            Entry::Occupied(entry) => return Err(Error::DuplicateGroup(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(group);
            }
        }
    }

    let mut ordered = Vec::with_capacity(by_name.len());
    for name in order {
        let name = name.as_ref();
        match by_name.shift_remove(name) {
            Some(group) => ordered.push(group),
            None if ordered.iter().any(|g: &RuleGroup| g.name == name) => {
                return Err(Error::DuplicateGroup(name.to_string()))
            }
            None => return Err(Error::UnknownGroup(name.to_string())),
        }
    }
    if let Some((name, _)) = by_name.first() {
        return Err(Error::UnorderedGroup(name.clone()));
    }
    assemble(ordered)
}

/// Map each written flag to the group index and fragment that write it
fn flag_writers(groups: &[RuleGroup]) -> Result<IndexMap<&Flag, (usize, &str)>, Error> {
    let mut writers: IndexMap<&Flag, (usize, &str)> = IndexMap::new();
    for (index, group) in groups.iter().enumerate() {
        for fragment in &group.fragments {
            for flag in fragment.writes() {
                if let Some((_, first)) = writers.get(flag) {
                    return Err(Error::DuplicateFlagWriter {
                        flag: flag.to_string(),
                        first: first.to_string(),
                        second: fragment.description().to_string(),
                    });
                }
                writers.insert(flag, (index, fragment.description()));
            }
        }
    }
    Ok(writers)
}

fn log_shadowing(groups: &[RuleGroup]) {
    let mut first_owner: IndexMap<KeyCode, &str> = IndexMap::new();
    for group in groups {
        for manipulator in group.manipulators() {
            if !manipulator.gates.is_empty() {
                continue;
            }
            if let Trigger::Key { key, .. } = manipulator.trigger {
                match first_owner.get(&key) {
                    Some(owner) if *owner != group.name => log::debug!(
                        "key '{}' is handled by group '{}'; the matching rule in '{}' is shadowed",
                        key,
                        owner,
                        group.name
                    ),
                    Some(_) => {}
                    None => {
                        first_owner.insert(key, &group.name);
                    }
                }
            }
        }
    }
}
