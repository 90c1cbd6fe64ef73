use once_cell::sync::OnceCell;

use crate::{
    constants,
    error::ServiceError,
    models::entry::{EntryChangeset, EntryFields},
    services::functional_patterns::{validation_rules, Validator},
};

/// Validator for entry creation. Every field is optional; only the tonnage
/// has a sign constraint.
pub fn new_entry_validator() -> Validator<EntryFields> {
    Validator::<EntryFields>::new()
        .field(|dto: &EntryFields| &dto.tonelada, validation_rules::finite("tonelada"))
        .field(|dto: &EntryFields| &dto.tonelada, validation_rules::non_negative("tonelada"))
        .field(|dto: &EntryFields| &dto.valor, validation_rules::finite("valor"))
}

/// Validator for partial updates: the same rules on the assigned values, plus
/// "something to change". Clearing a column always passes.
pub fn update_entry_validator() -> Validator<EntryChangeset> {
    let fields = new_entry_validator();
    Validator::<EntryChangeset>::new()
        .rule(|dto: &EntryChangeset| {
            if dto.is_empty() {
                Err(ServiceError::bad_request(constants::MESSAGE_NO_UPDATES))
            } else {
                Ok(())
            }
        })
        .rule(move |dto: &EntryChangeset| fields.validate(&dto.assigned()))
}

/// Validate a creation payload
pub fn validate_new_entry(dto: &EntryFields) -> Result<(), ServiceError> {
    static NEW_ENTRY_VALIDATOR: OnceCell<Validator<EntryFields>> = OnceCell::new();
    NEW_ENTRY_VALIDATOR
        .get_or_init(new_entry_validator)
        .validate(dto)
}

/// Validate an update payload
pub fn validate_update_entry(dto: &EntryChangeset) -> Result<(), ServiceError> {
    static UPDATE_ENTRY_VALIDATOR: OnceCell<Validator<EntryChangeset>> = OnceCell::new();
    UPDATE_ENTRY_VALIDATOR
        .get_or_init(update_entry_validator)
        .validate(dto)
}
