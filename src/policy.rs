//! Roles and the operation → role authorization table.
//!
//! Every role-gated handler goes through [`authorize`]; there is no other
//! place that compares roles.

use crate::accounts::Identity;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Assigned to every new identity.
    #[default]
    Student,
    Instructor,
    DepartmentHead,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Instructor, Role::DepartmentHead];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::DepartmentHead => "department_head",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.as_str() == raw.trim())
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Instructor => "Instructor",
            Role::DepartmentHead => "Department Head",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ViewInstructorDashboard,
    ManageCourse,
    ViewStudentDashboard,
    ViewDepartmentDashboard,
    ManageDepartment,
    AdminSurface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    Role(Role),
    Superuser,
}

fn requirement(op: Operation) -> Requirement {
    match op {
        Operation::ViewInstructorDashboard | Operation::ManageCourse => {
            Requirement::Role(Role::Instructor)
        }
        Operation::ViewStudentDashboard => Requirement::Role(Role::Student),
        Operation::ViewDepartmentDashboard | Operation::ManageDepartment => {
            Requirement::Role(Role::DepartmentHead)
        }
        Operation::AdminSurface => Requirement::Superuser,
    }
}

pub fn is_allowed(op: Operation, identity: &Identity) -> bool {
    match requirement(op) {
        Requirement::Role(required) => identity.role == Some(required),
        Requirement::Superuser => identity.is_superuser,
    }
}

pub fn authorize(op: Operation, identity: &Identity) -> AppResult<()> {
    if is_allowed(op, identity) {
        return Ok(());
    }
    let reason = match (requirement(op), identity.role) {
        (Requirement::Role(required), Some(actual)) => {
            format!("{:?} requires role {}, caller is {}", op, required, actual)
        }
        (Requirement::Role(required), None) => {
            format!("{:?} requires role {}, caller has no role", op, required)
        }
        (Requirement::Superuser, _) => format!("{:?} requires a superuser", op),
    };
    tracing::warn!(user = %identity.username, "{}", reason);
    Err(AppError::AuthorizationDenied(reason))
}

/// Where `/dashboard/` sends an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardTarget {
    Student,
    Instructor,
    DepartmentHead,
    Admin,
}

impl DashboardTarget {
    pub fn path(self) -> &'static str {
        match self {
            DashboardTarget::Student => "/student/dashboard/",
            DashboardTarget::Instructor => "/instructor/dashboard/",
            DashboardTarget::DepartmentHead => "/department/dashboard/",
            DashboardTarget::Admin => "/admin/",
        }
    }
}

pub fn dashboard_for(identity: &Identity) -> AppResult<DashboardTarget> {
    match identity.role {
        Some(Role::Student) => Ok(DashboardTarget::Student),
        Some(Role::Instructor) => Ok(DashboardTarget::Instructor),
        Some(Role::DepartmentHead) => Ok(DashboardTarget::DepartmentHead),
        None if identity.is_superuser => Ok(DashboardTarget::Admin),
        None => Err(AppError::AuthorizationDenied(format!(
            "user {} has no role",
            identity.username
        ))),
    }
}
