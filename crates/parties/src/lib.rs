//! Parties domain module (clients, suppliers and employees).
//!
//! Contact records the shop trades with, plus the staff who run it. Uniqueness
//! of phone numbers and email addresses spans all records of a kind, so it is
//! enforced by the store; the aggregates only validate shape.

pub mod client;
pub mod contact;
pub mod employee;
pub mod supplier;

pub use client::{
    Client, ClientCommand, ClientEvent, ClientId, ClientRegistered, ClientUpdated, RegisterClient,
    UpdateClient,
};
pub use contact::ContactInfo;
pub use employee::{
    ChangeEmployeeRole, Employee, EmployeeCommand, EmployeeEvent, EmployeeId, EmployeeRegistered,
    EmployeeRoleChanged, EmployeeUpdated, RegisterEmployee, UpdateEmployee,
};
pub use supplier::{
    RegisterSupplier, Supplier, SupplierCommand, SupplierEvent, SupplierId, SupplierRegistered,
    SupplierUpdated, UpdateSupplier,
};
