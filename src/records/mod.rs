pub mod queries;
pub mod types;

pub use queries::{
    add_chat_message, get_chat_messages, get_conditions, get_observations, get_patient,
    get_tasks, save_condition, save_observation, save_patient, save_task,
};
pub use types::{ChatMessage, Condition, Observation, Patient, Role, Task, TaskStatus};
