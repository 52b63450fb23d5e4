// Test modules for the wheel timer
//
// 时间轮定时器测试模块

#[cfg(test)]
mod timer {
    mod admission_tests;
    mod cancel_tests;
    mod delay_tests;
    mod lifecycle_tests;
    mod recurring_tests;
}

#[cfg(test)]
mod wheel {
    mod placement_tests;
    mod rounds_tests;
}
