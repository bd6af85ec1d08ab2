// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Where containers, env and volumes live inside a workload resource.
//!
//! Pod-template shaped workloads (Deployments, StatefulSets, ...) use the
//! defaults. Other shapes are described by a ClusterWorkloadResourceMapping.

use crate::error::{BindingError, Result};
use crate::jsonpath::{JsonPath, Segment};
use crate::types::ClusterWorkloadResourceMappingTemplate;
use serde_json::Value;
use tracing::debug;

/// Paths of one container list, the sub-paths are relative to a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerMapping {
    pub path: JsonPath,
    pub name: Option<JsonPath>,
    pub env: JsonPath,
    pub env_from: JsonPath,
    pub volume_mounts: JsonPath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadMapping {
    pub containers: Vec<ContainerMapping>,
    pub volumes: JsonPath,
}

fn fields(names: &[&str]) -> Vec<Segment> {
    names.iter().map(|n| Segment::Field(n.to_string())).collect()
}

fn field(name: &str) -> JsonPath {
    JsonPath::from_segments(fields(&[name]))
}

impl ContainerMapping {
    fn new(path: JsonPath) -> Self {
        ContainerMapping {
            path,
            name: Some(field("name")),
            env: field("env"),
            env_from: field("envFrom"),
            volume_mounts: field("volumeMounts"),
        }
    }

    /// Name of `container`, when the mapping knows where it lives.
    pub fn container_name(&self, container: &Value) -> Option<String> {
        let path = self.name.as_ref()?;
        path.evaluate_one(container)
            .ok()
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

impl Default for WorkloadMapping {
    fn default() -> Self {
        let mut containers = fields(&["spec", "template", "spec", "containers"]);
        containers.push(Segment::Wildcard);
        WorkloadMapping {
            containers: vec![ContainerMapping::new(JsonPath::from_segments(containers))],
            volumes: JsonPath::from_segments(fields(&["spec", "template", "spec", "volumes"])),
        }
    }
}

impl WorkloadMapping {
    /// Compile a mapping template. Container paths may select several
    /// locations, every other path has to be fixed.
    pub fn from_template(template: &ClusterWorkloadResourceMappingTemplate) -> Result<Self> {
        let defaults = WorkloadMapping::default();

        let volumes = match &template.volumes {
            Some(expr) => JsonPath::parse_fixed(expr)?,
            None => defaults.volumes,
        };

        if template.containers.is_empty() {
            return Ok(WorkloadMapping {
                containers: defaults.containers,
                volumes,
            });
        }

        let containers = template
            .containers
            .iter()
            .map(|c| {
                let mut mapping = ContainerMapping::new(JsonPath::parse(&c.path)?);
                mapping.name = c.name.as_deref().map(JsonPath::parse_fixed).transpose()?;
                if let Some(env) = &c.env {
                    mapping.env = JsonPath::parse_fixed(env)?;
                }
                if let Some(mounts) = &c.volume_mounts {
                    mapping.volume_mounts = JsonPath::parse_fixed(mounts)?;
                }
                Ok(mapping)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(WorkloadMapping { containers, volumes })
    }

    /// Replace the container lists with a single custom one. `path` points at
    /// the list itself.
    pub fn with_containers_path(mut self, path: &str) -> Result<Self> {
        let list = JsonPath::parse_fixed(path)?;
        self.containers = vec![ContainerMapping::new(list.join("[*]")?)];
        Ok(self)
    }

    /// Run `f` on every container the mapping selects in `doc` and return how
    /// many there were.
    pub fn for_each_container<F>(&self, doc: &mut Value, mut f: F) -> Result<usize>
    where
        F: FnMut(&ContainerMapping, &mut Value) -> Result<()>,
    {
        let mut count = 0;
        for mapping in &self.containers {
            for container in mapping.path.select_mut(doc) {
                if !container.is_object() {
                    continue;
                }
                if let Some(name) = mapping.container_name(container) {
                    debug!("Visiting container {}", name);
                }
                f(mapping, container)?;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// The list at `path` below `node`, created when missing.
pub fn list_mut<'a>(path: &JsonPath, node: &'a mut Value) -> Result<&'a mut Vec<Value>> {
    path.get_or_insert_with(node, || Value::Array(Vec::new()))?
        .as_array_mut()
        .ok_or_else(|| BindingError::InvalidWorkloadMapping(format!("{} is not a list", path)))
}

/// Drop the list at `path` below `node` when nothing is left in it.
pub fn prune_empty_list(path: &JsonPath, node: &mut Value) {
    let empty = path
        .get_mut(node)
        .and_then(|v| v.as_array().map(Vec::is_empty))
        .unwrap_or(false);
    if empty {
        path.remove(node);
    }
}
