//! The back-office pages and how each one talks to the backend.
//!
//! Every page is the same list view wired to a different resource. A
//! [`ResourceSchema`] carries everything that differs between them: where
//! the list comes from, how records are identified, which fields the search
//! box and the filter dropdowns look at, and which mutations are offered.
//! Which pages exist, and whether they are scoped to the acting cashier,
//! depends on the session's [`Role`].

use std::fmt;
use std::str::FromStr;

use crate::entity::STOCK_LEVEL_FIELD;
use crate::token::CASHIER_ID_CLAIM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOp {
    Approve,
    Reject,
    Delete,
    Update,
}

impl MutationOp {
    pub fn action(self) -> &'static str {
        match self {
            MutationOp::Approve => "Approve",
            MutationOp::Reject => "Reject",
            MutationOp::Delete => "Delete",
            MutationOp::Update => "Update",
        }
    }
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Cashier,
    Staff,
}

impl Role {
    /// Pages offered to this role, in menu order.
    pub fn pages(self) -> &'static [Page] {
        match self {
            Role::Admin => &[
                Page::Accounts,
                Page::Branches,
                Page::Inventory,
                Page::AuditTrail,
                Page::Sales,
                Page::Stocks,
                Page::MenuItems,
            ],
            Role::Cashier => &[Page::Inventory, Page::Sales, Page::Stocks, Page::MenuItems],
            Role::Staff => &[Page::Inventory, Page::Stocks],
        }
    }

    pub fn can_open(self, page: Page) -> bool {
        self.pages().contains(&page)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "cashier" => Ok(Role::Cashier),
            "staff" => Ok(Role::Staff),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "Admin",
            Role::Cashier => "Cashier",
            Role::Staff => "Staff",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Accounts,
    Branches,
    Inventory,
    AuditTrail,
    Sales,
    Stocks,
    MenuItems,
}

impl Page {
    pub const ALL: [Page; 7] = [
        Page::Accounts,
        Page::Branches,
        Page::Inventory,
        Page::AuditTrail,
        Page::Sales,
        Page::Stocks,
        Page::MenuItems,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Page::Accounts => "Accounts",
            Page::Branches => "Branches",
            Page::Inventory => "Inventory",
            Page::AuditTrail => "Audit Trail",
            Page::Sales => "Sales",
            Page::Stocks => "Stocks",
            Page::MenuItems => "Menu Items",
        }
    }

    /// How this page loads and mutates records for `role`.
    pub fn schema(self, role: Role) -> ResourceSchema {
        let cashier = role == Role::Cashier;
        match self {
            Page::Accounts => ResourceSchema::new("Account")
                .searching(&["firstName", "lastName", "username", "email"])
                .filtering(&["role", "branch.branchName", "status"])
                .columns(&["username", "firstName", "lastName", "role", "branch.branchName", "status"])
                .allowing(&[
                    MutationOp::Approve,
                    MutationOp::Reject,
                    MutationOp::Update,
                    MutationOp::Delete,
                ]),
            Page::Branches => ResourceSchema::new("Branch")
                .searching(&["branchName", "location"])
                .filtering(&["status"])
                .columns(&["branchName", "location", "status"])
                .allowing(&[MutationOp::Update, MutationOp::Delete]),
            Page::Inventory => ResourceSchema::new("Inventory")
                .scoped_for(cashier)
                .searching(&["itemName", "category"])
                .filtering(&["category", STOCK_LEVEL_FIELD, "branch.branchName"])
                .columns(&["itemName", "category", "quantity", "unit", STOCK_LEVEL_FIELD])
                .allowing(&[MutationOp::Update, MutationOp::Delete]),
            Page::AuditTrail => ResourceSchema::new("AuditTrail")
                .searching(&["action", "description", "user.username"])
                .filtering(&["action"])
                .columns(&["timestamp", "user.username", "action", "description"]),
            Page::Sales => ResourceSchema::new("Sales")
                .scoped_for(cashier)
                .searching(&["receiptNumber", "cashier.username", "paymentMethod"])
                .filtering(&["paymentMethod", "branch.branchName"])
                .columns(&["receiptNumber", "saleDate", "cashier.username", "paymentMethod", "totalAmount"]),
            Page::Stocks => {
                let schema = ResourceSchema::new("Stock")
                    .scoped_for(cashier)
                    .searching(&["itemName", "requestedBy.username"])
                    .filtering(&["status", "branch.branchName"])
                    .columns(&["itemName", "quantity", "requestedBy.username", "branch.branchName", "status"]);
                if role == Role::Admin {
                    schema.allowing(&[MutationOp::Approve, MutationOp::Reject])
                } else {
                    schema
                }
            }
            Page::MenuItems => ResourceSchema::new("MenuItem")
                .searching(&["name", "category"])
                .filtering(&["category", "status"])
                .columns(&["name", "category", "price", "status"])
                .allowing(&[MutationOp::Update, MutationOp::Delete]),
        }
    }
}

impl FromStr for Page {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "accounts" | "account" => Ok(Page::Accounts),
            "branches" | "branch" => Ok(Page::Branches),
            "inventory" => Ok(Page::Inventory),
            "audittrail" | "audit" => Ok(Page::AuditTrail),
            "sales" | "sale" => Ok(Page::Sales),
            "stocks" | "stock" => Ok(Page::Stocks),
            "menuitems" | "menu" => Ok(Page::MenuItems),
            _ => Err(format!("unknown page `{s}`")),
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a list view needs to know about one backend resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    pub resource: String,
    pub list_action: String,
    pub id_field: String,
    pub status_field: String,
    pub approved_status: String,
    pub rejected_status: String,
    pub search_fields: Vec<String>,
    pub filter_fields: Vec<String>,
    pub columns: Vec<String>,
    pub operations: Vec<MutationOp>,
    /// Claim whose value scopes the list fetch
    pub scope_claim: Option<String>,
    /// Query parameter the scope id is sent as
    pub scope_param: String,
    /// Reload the whole list after each successful mutation
    pub refetch_after_mutation: bool,
}

impl ResourceSchema {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            list_action: "GetAll".into(),
            id_field: "id".into(),
            status_field: "status".into(),
            approved_status: "Approved".into(),
            rejected_status: "Rejected".into(),
            search_fields: Vec::new(),
            filter_fields: Vec::new(),
            columns: Vec::new(),
            operations: Vec::new(),
            scope_claim: None,
            scope_param: CASHIER_ID_CLAIM.into(),
            refetch_after_mutation: false,
        }
    }

    pub fn searching(mut self, fields: &[&str]) -> Self {
        self.search_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn filtering(mut self, fields: &[&str]) -> Self {
        self.filter_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn columns(mut self, fields: &[&str]) -> Self {
        self.columns = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn allowing(mut self, operations: &[MutationOp]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    /// Scope the list to the acting cashier when `scoped` is set.
    fn scoped_for(self, scoped: bool) -> Self {
        if scoped {
            self.with_scope(CASHIER_ID_CLAIM, "GetByCashier")
        } else {
            self
        }
    }

    pub fn with_scope(mut self, claim: impl Into<String>, list_action: impl Into<String>) -> Self {
        self.scope_claim = Some(claim.into());
        self.list_action = list_action.into();
        self
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_refetch(mut self) -> Self {
        self.refetch_after_mutation = true;
        self
    }

    pub fn supports(&self, op: MutationOp) -> bool {
        self.operations.contains(&op)
    }

    pub fn list_path(&self) -> String {
        format!("{}/{}", self.resource, self.list_action)
    }

    pub fn mutation_path(&self, op: MutationOp, id: i64) -> String {
        format!("{}/{}/{id}", self.resource, op.action())
    }

    /// Status a successful approve or reject leaves behind.
    pub fn status_after(&self, op: MutationOp) -> Option<&str> {
        match op {
            MutationOp::Approve => Some(self.approved_status.as_str()),
            MutationOp::Reject => Some(self.rejected_status.as_str()),
            _ => None,
        }
    }
}
