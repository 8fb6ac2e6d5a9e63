//! Directory fixtures
//!
//! Loads contracts and persons from a YAML file into the in-memory directories, for deployments
//! where the contract and person subsystems are not reachable.

use std::fs;

use anyhow::Context;
use serde::Deserialize;

use super::{ContractInfo, InMemoryContracts, InMemoryPersons};
use crate::core_types::{OrgId, PersonId};

#[derive(Debug, Deserialize)]
pub struct PersonFixture {
    pub org: OrgId,
    pub id: PersonId,
    pub name: String,
    pub national_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryFixture {
    #[serde(default)]
    pub contracts: Vec<ContractInfo>,
    #[serde(default)]
    pub persons: Vec<PersonFixture>,
}

impl DirectoryFixture {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read directory fixture: {}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path))
    }

    pub fn into_directories(self) -> (InMemoryContracts, InMemoryPersons) {
        let contracts = InMemoryContracts::new();
        for c in self.contracts {
            contracts.insert(c.id, c.org, c.status);
        }
        let persons = InMemoryPersons::new();
        for p in self.persons {
            persons.insert(p.org, p.id, &p.name, &p.national_id);
        }
        (contracts, persons)
    }
}
