pub const TOPIC_STATE: &str = "aquatimer/controller/state";
pub const TOPIC_RELAY_STATE: &str = "aquatimer/controller/relay";

pub const TOPIC_CMD_TIME: &str = "aquatimer/cmnd/time";
pub const TOPIC_CMD_SCHEDULE_ADD: &str = "aquatimer/cmnd/schedule/add";
pub const TOPIC_CMD_SCHEDULE_REMOVE: &str = "aquatimer/cmnd/schedule/remove";
pub const TOPIC_CMD_SCHEDULE_CLEAR: &str = "aquatimer/cmnd/schedule/clear";
pub const TOPIC_CMD_VACATION: &str = "aquatimer/cmnd/vacation";
pub const TOPIC_CMD_MAINTENANCE: &str = "aquatimer/cmnd/maintenance";
