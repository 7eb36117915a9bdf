//! Built-in field-type maps for entity types whose Bitrix metadata
//! endpoint returns no type information at all (`user.fields`,
//! `voximplant.statistic.*`, `crm.stagehistory.*`).

/// `user.fields` returns a flat `{FIELD: description}` map with no type
/// metadata; this is the canonical type map substituted in its place.
pub static USER_FIELD_TYPES: &[(&str, &str)] = &[
    ("ID", "integer"),
    ("XML_ID", "string"),
    ("ACTIVE", "char"),
    ("NAME", "string"),
    ("LAST_NAME", "string"),
    ("SECOND_NAME", "string"),
    ("TITLE", "string"),
    ("EMAIL", "string"),
    ("LAST_LOGIN", "datetime"),
    ("DATE_REGISTER", "datetime"),
    ("TIME_ZONE", "string"),
    ("IS_ONLINE", "char"),
    ("TIME_ZONE_OFFSET", "string"),
    ("TIMESTAMP_X", "datetime"),
    ("LAST_ACTIVITY_DATE", "datetime"),
    ("PERSONAL_GENDER", "string"),
    ("PERSONAL_PROFESSION", "string"),
    ("PERSONAL_WWW", "string"),
    ("PERSONAL_BIRTHDAY", "date"),
    ("PERSONAL_PHOTO", "integer"),
    ("PERSONAL_ICQ", "string"),
    ("PERSONAL_PHONE", "string"),
    ("PERSONAL_FAX", "string"),
    ("PERSONAL_MOBILE", "string"),
    ("PERSONAL_PAGER", "string"),
    ("PERSONAL_STREET", "string"),
    ("PERSONAL_CITY", "string"),
    ("PERSONAL_STATE", "string"),
    ("PERSONAL_ZIP", "string"),
    ("PERSONAL_COUNTRY", "string"),
    ("PERSONAL_MAILBOX", "string"),
    ("PERSONAL_NOTES", "text"),
    ("WORK_PHONE", "string"),
    ("WORK_COMPANY", "string"),
    ("WORK_POSITION", "string"),
    ("WORK_DEPARTMENT", "string"),
    ("WORK_WWW", "string"),
    ("WORK_FAX", "string"),
    ("WORK_PAGER", "string"),
    ("WORK_STREET", "string"),
    ("WORK_MAILBOX", "string"),
    ("WORK_CITY", "string"),
    ("WORK_STATE", "string"),
    ("WORK_ZIP", "string"),
    ("WORK_COUNTRY", "string"),
    ("WORK_PROFILE", "string"),
    ("WORK_LOGO", "string"),
    ("WORK_NOTES", "text"),
    ("UF_SKYPE_LINK", "string"),
    ("UF_ZOOM", "string"),
    ("UF_EMPLOYMENT_DATE", "datetime"),
    ("UF_TIMEMAN", "char"),
    ("UF_DEPARTMENT", "string"),
    ("UF_INTERESTS", "text"),
    ("UF_SKILLS", "text"),
    ("UF_WEB_SITES", "text"),
    ("UF_XING", "string"),
    ("UF_LINKEDIN", "string"),
    ("UF_FACEBOOK", "string"),
    ("UF_TWITTER", "string"),
    ("UF_SKYPE", "string"),
    ("UF_DISTRICT", "string"),
    ("UF_PHONE_INNER", "string"),
    ("USER_TYPE", "string"),
];

/// `voximplant.statistic.get` has no `.fields` method.
pub static CALL_FIELD_TYPES: &[(&str, &str)] = &[
    ("ID", "integer"),
    ("CALL_ID", "string"),
    ("CALL_TYPE", "integer"),
    ("CALL_VOTE", "integer"),
    ("COMMENT", "string"),
    ("PORTAL_USER_ID", "string"),
    ("PORTAL_NUMBER", "string"),
    ("PHONE_NUMBER", "string"),
    ("CALL_DURATION", "integer"),
    ("CALL_START_DATE", "datetime"),
    ("COST", "string"),
    ("COST_CURRENCY", "string"),
    ("CALL_FAILED_CODE", "string"),
    ("CALL_FAILED_REASON", "string"),
    ("CRM_ACTIVITY_ID", "string"),
    ("CRM_ENTITY_ID", "string"),
    ("CRM_ENTITY_TYPE", "string"),
    ("REST_APP_ID", "string"),
    ("REST_APP_NAME", "string"),
    ("REDIAL_ATTEMPT", "integer"),
    ("SESSION_ID", "string"),
    ("TRANSCRIPT_ID", "string"),
    ("TRANSCRIPT_PENDING", "string"),
    ("RECORD_FILE_ID", "string"),
];

/// `crm.stagehistory.list` has no `.fields` method.
pub static STAGE_HISTORY_FIELD_TYPES: &[(&str, &str)] = &[
    ("ID", "integer"),
    ("TYPE_ID", "integer"),
    ("OWNER_ID", "integer"),
    ("CREATED_TIME", "datetime"),
    ("CATEGORY_ID", "integer"),
    ("STAGE_SEMANTIC_ID", "string"),
    ("STAGE_ID", "string"),
    ("STATUS_SEMANTIC_ID", "string"),
    ("STATUS_ID", "string"),
];

/// Builds a `crm.*.fields`-shaped metadata object from a canonical type
/// map, used for entity types whose real API exposes no type metadata.
pub fn build_field_definitions(
    types: &[(&str, &str)],
    required_field: &str,
) -> serde_json::Map<String, serde_json::Value> {
    types
        .iter()
        .map(|(name, ty)| {
            let def = serde_json::json!({
                "type": ty,
                "title": name,
                "isMultiple": false,
                "isRequired": *name == required_field,
            });
            (name.to_string(), def)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_user_field_definitions_with_id_required() {
        let defs = build_field_definitions(USER_FIELD_TYPES, "ID");
        assert_eq!(defs["ID"]["isRequired"], serde_json::json!(true));
        assert_eq!(defs["NAME"]["isRequired"], serde_json::json!(false));
        assert_eq!(defs["LAST_LOGIN"]["type"], serde_json::json!("datetime"));
    }

    #[test]
    fn builds_call_field_definitions_with_call_id_required() {
        let defs = build_field_definitions(CALL_FIELD_TYPES, "CALL_ID");
        assert_eq!(defs["CALL_ID"]["isRequired"], serde_json::json!(true));
    }
}
