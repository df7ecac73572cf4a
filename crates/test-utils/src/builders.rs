#![allow(dead_code)]

use devdag::config::model::{
    ModuleDeclaration, RunnableDeclaration, ServiceDeclaration,
};

/// Builder for `ModuleDeclaration` to simplify test setup.
pub struct ModuleDeclarationBuilder {
    decl: ModuleDeclaration,
}

impl ModuleDeclarationBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            decl: ModuleDeclaration {
                name: name.to_string(),
                module_type: "container".to_string(),
                build_cmd: None,
                build_deps: vec![],
                services: vec![],
                tasks: vec![],
                tests: vec![],
            },
        }
    }

    pub fn build_cmd(mut self, cmd: &str) -> Self {
        self.decl.build_cmd = Some(cmd.to_string());
        self
    }

    pub fn build_dep(mut self, dep: &str) -> Self {
        self.decl.build_deps.push(dep.to_string());
        self
    }

    pub fn service(mut self, name: &str, deps: &[&str]) -> Self {
        self.decl.services.push(ServiceDeclaration {
            name: name.to_string(),
            cmd: Some(format!("run {name}")),
            deps: deps.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn task(mut self, name: &str, deps: &[&str]) -> Self {
        self.decl.tasks.push(RunnableDeclaration {
            name: name.to_string(),
            cmd: format!("task {name}"),
            deps: deps.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn test(mut self, name: &str, deps: &[&str]) -> Self {
        self.decl.tests.push(RunnableDeclaration {
            name: name.to_string(),
            cmd: format!("test {name}"),
            deps: deps.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> ModuleDeclaration {
        self.decl
    }
}
