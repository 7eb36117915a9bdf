//! Entity type catalogue: Bitrix API prefixes, warehouse table names, and
//! the entity-specific high-water-mark compare field used by incremental
//! sync (§4.F.2).

/// The nine known CRM/collaboration entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Deal,
    Contact,
    Lead,
    Company,
    User,
    Task,
    Call,
    StageHistoryDeal,
    StageHistoryLead,
}

impl EntityType {
    pub const ALL: [EntityType; 9] = [
        EntityType::Deal,
        EntityType::Contact,
        EntityType::Lead,
        EntityType::Company,
        EntityType::User,
        EntityType::Task,
        EntityType::Call,
        EntityType::StageHistoryDeal,
        EntityType::StageHistoryLead,
    ];

    /// Lowercase wire name, as used in sync_config/sync_state/sync_logs
    /// and in queue dedup keys.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Deal => "deal",
            EntityType::Contact => "contact",
            EntityType::Lead => "lead",
            EntityType::Company => "company",
            EntityType::User => "user",
            EntityType::Task => "task",
            EntityType::Call => "call",
            EntityType::StageHistoryDeal => "stage_history_deal",
            EntityType::StageHistoryLead => "stage_history_lead",
        }
    }

    pub fn from_str(s: &str) -> Option<EntityType> {
        Some(match s {
            "deal" => EntityType::Deal,
            "contact" => EntityType::Contact,
            "lead" => EntityType::Lead,
            "company" => EntityType::Company,
            "user" => EntityType::User,
            "task" => EntityType::Task,
            "call" => EntityType::Call,
            "stage_history_deal" => EntityType::StageHistoryDeal,
            "stage_history_lead" => EntityType::StageHistoryLead,
            _ => return None,
        })
    }

    /// True for the four `crm.<type>.*` namespaced entities.
    pub fn is_crm(self) -> bool {
        matches!(
            self,
            EntityType::Deal | EntityType::Contact | EntityType::Lead | EntityType::Company
        )
    }

    /// Bitrix API method namespace prefix, e.g. `crm.deal`.
    pub fn bitrix_prefix(self) -> &'static str {
        match self {
            EntityType::Deal => "crm.deal",
            EntityType::Contact => "crm.contact",
            EntityType::Lead => "crm.lead",
            EntityType::Company => "crm.company",
            EntityType::User => "user",
            EntityType::Task => "tasks.task",
            EntityType::Call => "voximplant.statistic",
            EntityType::StageHistoryDeal | EntityType::StageHistoryLead => "crm.stagehistory",
        }
    }

    /// Warehouse table name: `crm_<plural>` for CRM entities,
    /// `bitrix_users`/`bitrix_tasks`/`bitrix_calls` for the rest, and
    /// `stage_history_deals`/`stage_history_leads` for stage history.
    pub fn table_name(self) -> &'static str {
        match self {
            EntityType::Deal => "crm_deals",
            EntityType::Contact => "crm_contacts",
            EntityType::Lead => "crm_leads",
            EntityType::Company => "crm_companies",
            EntityType::User => "bitrix_users",
            EntityType::Task => "bitrix_tasks",
            EntityType::Call => "bitrix_calls",
            EntityType::StageHistoryDeal => "stage_history_deals",
            EntityType::StageHistoryLead => "stage_history_leads",
        }
    }

    /// The compare field used to build the incremental-sync filter.
    /// Entity-specific per §4.F.2: `DATE_MODIFY` for CRM entities,
    /// `CHANGED_DATE` for tasks, `CREATED_TIME` for stage history,
    /// `LAST_LOGIN` for users, `CALL_START_DATE` for calls.
    pub fn incremental_compare_field(self) -> &'static str {
        match self {
            EntityType::Deal | EntityType::Contact | EntityType::Lead | EntityType::Company => {
                "DATE_MODIFY"
            }
            EntityType::Task => "CHANGED_DATE",
            EntityType::StageHistoryDeal | EntityType::StageHistoryLead => "CREATED_TIME",
            EntityType::User => "LAST_LOGIN",
            EntityType::Call => "CALL_START_DATE",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_follow_the_spec() {
        assert_eq!(EntityType::Deal.table_name(), "crm_deals");
        assert_eq!(EntityType::User.table_name(), "bitrix_users");
        assert_eq!(EntityType::Task.table_name(), "bitrix_tasks");
        assert_eq!(EntityType::Call.table_name(), "bitrix_calls");
        assert_eq!(EntityType::StageHistoryDeal.table_name(), "stage_history_deals");
        assert_eq!(EntityType::StageHistoryLead.table_name(), "stage_history_leads");
    }

    #[test]
    fn incremental_compare_fields_are_entity_specific() {
        assert_eq!(EntityType::Deal.incremental_compare_field(), "DATE_MODIFY");
        assert_eq!(EntityType::Task.incremental_compare_field(), "CHANGED_DATE");
        assert_eq!(
            EntityType::StageHistoryDeal.incremental_compare_field(),
            "CREATED_TIME"
        );
        assert_eq!(EntityType::User.incremental_compare_field(), "LAST_LOGIN");
        assert_eq!(EntityType::Call.incremental_compare_field(), "CALL_START_DATE");
    }

    #[test]
    fn round_trips_through_as_str() {
        for et in EntityType::ALL {
            assert_eq!(EntityType::from_str(et.as_str()), Some(et));
        }
    }

    #[test]
    fn only_the_four_crm_types_are_crm() {
        assert!(EntityType::Deal.is_crm());
        assert!(!EntityType::User.is_crm());
        assert!(!EntityType::Task.is_crm());
    }
}
