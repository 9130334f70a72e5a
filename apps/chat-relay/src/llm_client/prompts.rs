// User-facing text returned in place of a model reply when the upstream call fails.
// These are sent to the browser verbatim, so they never carry error details.

pub const UPSTREAM_APOLOGY: &str = "I'm sorry, I'm having trouble accessing my information \
    right now. Please try again in a moment.";

pub const TIMEOUT_APOLOGY: &str =
    "I'm sorry, my response is taking longer than expected. Please try asking again.";

pub const TRANSPORT_APOLOGY: &str = "I apologize, but I encountered an error while processing \
    your request. Please try again.";
