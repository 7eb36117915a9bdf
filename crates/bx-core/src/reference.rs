//! Declarative catalogue of Bitrix reference/dictionary types.
//!
//! The set of reference types is closed and known at compile time, so it
//! is represented as a plain array rather than a runtime-populated map.

/// A single column in a reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceFieldDef {
    pub column_name: &'static str,
    pub sql_type: &'static str,
    pub nullable: bool,
}

const fn field(column_name: &'static str, sql_type: &'static str) -> ReferenceFieldDef {
    ReferenceFieldDef {
        column_name,
        sql_type,
        nullable: true,
    }
}

const fn required(column_name: &'static str, sql_type: &'static str) -> ReferenceFieldDef {
    ReferenceFieldDef {
        column_name,
        sql_type,
        nullable: false,
    }
}

pub static STATUS_FIELDS: &[ReferenceFieldDef] = &[
    required("status_id", "VARCHAR(100)"),
    required("entity_id", "VARCHAR(100)"),
    required("category_id", "VARCHAR(50)"),
    field("name", "VARCHAR(500)"),
    field("name_init", "VARCHAR(500)"),
    field("sort", "INTEGER"),
    field("system", "VARCHAR(10)"),
    field("color", "VARCHAR(50)"),
    field("semantics", "VARCHAR(50)"),
    field("extra_color", "VARCHAR(50)"),
    field("extra_semantics", "VARCHAR(50)"),
];

pub static DEAL_CATEGORY_FIELDS: &[ReferenceFieldDef] = &[
    required("id", "VARCHAR(50)"),
    field("name", "VARCHAR(500)"),
    field("sort", "INTEGER"),
    field("is_locked", "VARCHAR(10)"),
    field("created_date", "TIMESTAMP"),
];

pub static CURRENCY_FIELDS: &[ReferenceFieldDef] = &[
    required("currency", "VARCHAR(20)"),
    field("amount_cnt", "VARCHAR(20)"),
    field("amount", "VARCHAR(50)"),
    field("sort", "INTEGER"),
    field("base", "VARCHAR(10)"),
    field("full_name", "VARCHAR(500)"),
    field("lid", "VARCHAR(10)"),
    field("format_string", "VARCHAR(100)"),
    field("dec_point", "VARCHAR(10)"),
    field("thousands_sep", "VARCHAR(10)"),
    field("decimals", "VARCHAR(10)"),
    field("date_update", "TIMESTAMP"),
];

pub static ENUM_VALUES_FIELDS: &[ReferenceFieldDef] = &[
    required("field_name", "VARCHAR(100)"),
    required("entity_type", "VARCHAR(50)"),
    required("item_id", "VARCHAR(50)"),
    field("value", "VARCHAR(500)"),
    field("sort", "INTEGER"),
    field("is_default", "VARCHAR(10)"),
    field("xml_id", "VARCHAR(100)"),
];

/// One entry in the reference registry.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceType {
    pub name: &'static str,
    pub table_name: &'static str,
    /// Empty string for types with no direct API method (populated
    /// opportunistically elsewhere, e.g. `enum_values`).
    pub api_method: &'static str,
    pub unique_key: &'static [&'static str],
    pub fields: &'static [ReferenceFieldDef],
    pub requires_category_iteration: bool,
}

/// The stable set of registered reference types.
pub static REFERENCE_TYPES: &[ReferenceType] = &[
    ReferenceType {
        name: "crm_status",
        table_name: "ref_crm_statuses",
        api_method: "crm.status.list",
        unique_key: &["status_id", "entity_id", "category_id"],
        fields: STATUS_FIELDS,
        requires_category_iteration: true,
    },
    ReferenceType {
        name: "crm_deal_category",
        table_name: "ref_crm_deal_categories",
        api_method: "crm.dealcategory.list",
        unique_key: &["id"],
        fields: DEAL_CATEGORY_FIELDS,
        requires_category_iteration: false,
    },
    ReferenceType {
        name: "crm_currency",
        table_name: "ref_crm_currencies",
        api_method: "crm.currency.list",
        unique_key: &["currency"],
        fields: CURRENCY_FIELDS,
        requires_category_iteration: false,
    },
    ReferenceType {
        name: "enum_values",
        table_name: "ref_enum_values",
        api_method: "",
        unique_key: &["field_name", "entity_type", "item_id"],
        fields: ENUM_VALUES_FIELDS,
        requires_category_iteration: false,
    },
];

/// Looks up a reference type by its registry name.
pub fn get_reference_type(name: &str) -> Option<&'static ReferenceType> {
    REFERENCE_TYPES.iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_four_entries() {
        assert_eq!(REFERENCE_TYPES.len(), 4);
    }

    #[test]
    fn crm_status_requires_category_iteration() {
        let t = get_reference_type("crm_status").unwrap();
        assert!(t.requires_category_iteration);
        assert_eq!(t.unique_key, &["status_id", "entity_id", "category_id"]);
    }

    #[test]
    fn enum_values_has_no_api_method() {
        let t = get_reference_type("enum_values").unwrap();
        assert_eq!(t.api_method, "");
    }

    #[test]
    fn unknown_name_returns_none() {
        assert!(get_reference_type("not_a_real_type").is_none());
    }
}
